//! Duplicate-webhook specs: both deliveries are acked, one does work.

use super::prelude::*;
use claw_daemon::http::{read_request, write_response, Ingested};
use serde_json::json;
use tokio::io::BufReader;

fn session_event(session_id: &str, issue_id: &str) -> String {
    let body = json!({
        "type": "AgentSessionEvent",
        "action": "created",
        "data": { "sessionId": session_id, "issue": { "id": issue_id } }
    })
    .to_string();
    format!(
        "POST /webhook HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    )
}

async fn deliver(hx: &Harness, raw: &str) -> String {
    let mut reader = BufReader::new(raw.as_bytes());
    let outcome = read_request(&mut reader).await.unwrap();

    let mut response = Vec::new();
    write_response(&mut response, &outcome).await.unwrap();

    if let Ingested::Payload(payload) = outcome {
        hx.router.dispatch(payload).await;
    }
    String::from_utf8_lossy(&response).into_owned()
}

/// S6: the same session webhook twice. Both get `200 ok`; only the first
/// triggers downstream work.
#[tokio::test]
async fn duplicate_session_webhook_is_acked_but_inert() {
    let hx = harness();
    hx.seed_issue("issue-1", "ENG-1");
    hx.runner.push_success("work");
    hx.runner.push_success(&passing_verdict_output());

    let raw = session_event("sess-X", "issue-1");
    let first = deliver(&hx, &raw).await;
    let after_first = hx.runner.requests().len();
    let second = deliver(&hx, &raw).await;

    assert!(first.starts_with("HTTP/1.1 200 OK"));
    assert!(second.starts_with("HTTP/1.1 200 OK"));
    assert_eq!(hx.runner.requests().len(), after_first);

    // Exactly one dispatch record exists.
    let state = hx.engine.store().read().unwrap();
    assert_eq!(
        state.dispatches.active.len() + state.dispatches.completed.len(),
        1
    );
}

/// Dedup survives a restart: the event key is persisted, so a replayed
/// webhook is inert even with fresh in-memory state.
#[tokio::test]
async fn persisted_event_keys_survive_replays() {
    let hx = harness();
    hx.seed_issue("issue-2", "ENG-2");
    let raw = session_event("sess-R", "issue-2");
    deliver(&hx, &raw).await;

    // A fresh TTL window (in-memory map cleared by sweep after expiry)
    // still cannot re-run the session: the key is on disk.
    hx.clock
        .advance(std::time::Duration::from_millis(10 * 60 * 1000));
    hx.engine.sweep_dedup();

    let before = hx.runner.requests().len();
    deliver(&hx, &raw).await;
    assert_eq!(hx.runner.requests().len(), before);
}
