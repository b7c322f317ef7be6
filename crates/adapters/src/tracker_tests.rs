// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn issue(id: &str, identifier: &str) -> IssueDetails {
    IssueDetails {
        id: id.to_string(),
        identifier: identifier.to_string(),
        title: "Fix flaky cache test".to_string(),
        team: IssueTeam { id: "team-eng".to_string(), key: "ENG".to_string(), issue_estimation_type: None },
        ..IssueDetails::default()
    }
}

#[tokio::test]
async fn fake_serves_seeded_issue() {
    let tracker = FakeTrackerAdapter::new().with_issue(issue("i-1", "ENG-1"));
    let details = tracker.get_issue_details("i-1").await.unwrap();
    assert_eq!(details.identifier, "ENG-1");
    assert!(matches!(
        tracker.get_issue_details("i-404").await,
        Err(TrackerError::IssueNotFound(_))
    ));
}

#[tokio::test]
async fn fake_records_comments_with_identity() {
    let tracker = FakeTrackerAdapter::new().with_issue(issue("i-1", "ENG-1"));
    let identity = AgentIdentity {
        agent_id: "claude".to_string(),
        label: "Claw".to_string(),
        avatar_url: None,
    };
    let id = tracker
        .create_comment("i-1", "done", Some(&identity))
        .await
        .unwrap();
    assert!(id.starts_with("comment-"));

    let comments = tracker.comments();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].as_identity.as_deref(), Some("claude"));
}

#[tokio::test]
async fn identity_failure_mode_surfaces_distinct_error() {
    let tracker = FakeTrackerAdapter::new()
        .with_issue(issue("i-1", "ENG-1"))
        .with_identity_posting_failing();
    let identity = AgentIdentity {
        agent_id: "claude".to_string(),
        label: "Claw".to_string(),
        avatar_url: None,
    };
    assert!(matches!(
        tracker.create_comment("i-1", "x", Some(&identity)).await,
        Err(TrackerError::IdentityUnavailable(_))
    ));
    // Plain posting still works.
    tracker.create_comment("i-1", "x", None).await.unwrap();
}

#[tokio::test]
async fn team_states_cover_the_full_taxonomy() {
    let tracker = FakeTrackerAdapter::new();
    let states = tracker.get_team_states("team-eng").await.unwrap();
    assert!(states.iter().any(|s| s.state_type == WorkflowStateType::Triage));
    assert!(states.iter().any(|s| s.state_type == WorkflowStateType::Completed));
    assert!(states.iter().any(|s| s.name == "In Review"));
}

#[tokio::test]
async fn webhook_management_roundtrip() {
    let tracker = FakeTrackerAdapter::new();
    let hook = tracker.create_webhook("https://a.example/hook").await.unwrap();
    tracker.update_webhook(&hook.id, "https://b.example/hook").await.unwrap();
    assert_eq!(tracker.webhooks()[0].url, "https://b.example/hook");
    tracker.delete_webhook(&hook.id).await.unwrap();
    assert!(tracker.list_webhooks().await.unwrap().is_empty());
}
