//! Dispatch lifecycle specs: happy path, rework, escalation, watchdog.

use super::prelude::*;
use claw_core::config::PluginConfig;
use claw_core::dispatch::DispatchStatus;
use claw_core::CompletedStatus;
use claw_engine::runtime::DispatchRequest;

/// Happy path: dispatched → working → auditing → done, with artifacts,
/// ordered notifications, and a success comment.
#[tokio::test]
async fn dispatch_runs_worker_audit_and_completes() {
    let hx = harness();
    hx.seed_issue("issue-100", "ENG-100");
    hx.runner.push_success("Implemented fix.");
    hx.runner.push_success(&passing_verdict_output());

    hx.engine
        .start_and_drive("issue-100", DispatchRequest::default())
        .await
        .unwrap();

    let state = hx.engine.store().read().unwrap();
    assert!(state.dispatches.active.get("ENG-100").is_none());
    let completed = &state.dispatches.completed["ENG-100"];
    assert_eq!(completed.status, CompletedStatus::Done);

    // Notifications arrive in lifecycle order.
    let kinds = hx.notified();
    let order: Vec<usize> = ["Dispatched", "Worker started", "Audit started", "Audit passed"]
        .iter()
        .map(|needle| kinds.iter().position(|n| n.contains(needle)).unwrap())
        .collect();
    assert!(order.windows(2).all(|w| w[0] < w[1]), "out of order: {kinds:?}");

    // Artifact files exist in the worktree.
    let claw_dir = hx.dir.path().join("worktrees/claw-eng-100/.claw");
    assert!(claw_dir.join("worker-0.md").exists());
    assert!(claw_dir.join("audit-0.json").exists());
    assert!(claw_dir.join("log.jsonl").exists());

    // A success comment landed on the issue.
    assert!(hx
        .comment_bodies()
        .iter()
        .any(|c| c.contains("Audit Passed")));
}

/// Rework: a failed audit sends the dispatch back to working with the
/// gap list; the second attempt completes.
#[tokio::test]
async fn failed_audit_reworks_once_then_passes() {
    let hx = harness();
    hx.seed_issue("issue-200", "ENG-200");
    hx.runner.push_success("First attempt.");
    hx.runner.push_success(&failing_verdict_output("missing tests"));
    hx.runner.push_success("Second attempt with tests.");
    hx.runner.push_success(&passing_verdict_output());

    hx.engine
        .start_and_drive("issue-200", DispatchRequest::default())
        .await
        .unwrap();

    let state = hx.engine.store().read().unwrap();
    let completed = &state.dispatches.completed["ENG-200"];
    assert_eq!(completed.status, CompletedStatus::Done);
    assert_eq!(completed.total_attempts, 2);

    // The rework prompt carried the gaps forward.
    assert!(hx.runner.requests()[2].prompt.contains("missing tests"));
    assert!(hx.notified().iter().any(|n| n.contains("Audit failed")));
    assert!(hx
        .comment_bodies()
        .iter()
        .any(|c| c.contains("rework") && c.contains("missing tests")));
}

/// Escalation: with a zero rework budget one failed audit goes stuck,
/// the issue moves to triage, and a help comment is posted.
#[tokio::test]
async fn exhausted_rework_budget_escalates() {
    let hx = harness_with(PluginConfig {
        max_rework_attempts: 0,
        ..PluginConfig::default()
    });
    hx.seed_issue("issue-300", "ENG-300");
    hx.runner.push_success("Attempt.");
    hx.runner.push_success(&failing_verdict_output("broken build"));

    hx.engine
        .start_and_drive("issue-300", DispatchRequest::default())
        .await
        .unwrap();

    let active = hx.engine.store().get_active("ENG-300").unwrap().unwrap();
    assert_eq!(active.status, DispatchStatus::Stuck);
    assert_eq!(active.stuck_reason.as_deref(), Some("audit_failed_1x"));

    assert_eq!(hx.tracker.last_state_id("issue-300").as_deref(), Some("st-triage"));
    assert!(hx.notified().iter().any(|n| n.contains("Needs your help")));
    assert!(hx
        .comment_bodies()
        .iter()
        .any(|c| c.contains("Needs Your Help") && c.contains("broken build")));
}

/// Watchdog: a doubly-killed worker sticks the dispatch without ever
/// starting the audit.
#[tokio::test]
async fn watchdog_double_kill_sticks_the_dispatch() {
    let hx = harness();
    hx.seed_issue("issue-400", "ENG-400");
    hx.runner.push_watchdog_kill();

    hx.engine
        .start_and_drive("issue-400", DispatchRequest::default())
        .await
        .unwrap();

    let active = hx.engine.store().get_active("ENG-400").unwrap().unwrap();
    assert_eq!(active.status, DispatchStatus::Stuck);
    assert_eq!(active.stuck_reason.as_deref(), Some("watchdog_kill_2x"));

    // The audit never ran.
    assert_eq!(hx.runner.requests().len(), 1);
    assert_eq!(hx.tracker.last_state_id("issue-400").as_deref(), Some("st-triage"));
    assert!(hx.notified().iter().any(|n| n.contains("Agent timed out")));
    assert!(hx
        .comment_bodies()
        .iter()
        .any(|c| c.contains("Agent Timed Out")));
}

/// Every status written to disk respects the transition table and the
/// stuck-reason invariant.
#[tokio::test]
async fn persisted_state_respects_invariants() {
    let hx = harness();
    hx.seed_issue("issue-500", "ENG-500");
    hx.runner.push_success("Attempt.");
    hx.runner.push_success(&failing_verdict_output("gap"));
    hx.runner.push_success("Again.");
    hx.runner.push_success(&passing_verdict_output());

    hx.engine
        .start_and_drive("issue-500", DispatchRequest::default())
        .await
        .unwrap();

    let state = hx.engine.store().read().unwrap();
    for dispatch in state.dispatches.active.values() {
        assert!(dispatch.stuck_reason_consistent());
    }
    // Completed and active sets never share an identifier.
    for id in state.dispatches.completed.keys() {
        assert!(!state.dispatches.active.contains_key(id));
    }
    // Session map is clean after completion.
    assert!(state.session_map.is_empty());
    // The idempotency FIFO stays bounded.
    assert!(state.processed_events.len() <= claw_storage::PROCESSED_EVENTS_CAP);
}
