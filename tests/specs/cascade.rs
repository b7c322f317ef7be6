//! Project DAG cascade specs.

use super::prelude::*;
use claw_core::project::IssueDispatchStatus;
use claw_core::test_support::chain_project;

/// Finishing a project issue unblocks its dependent: the dependent's
/// status flips to dispatched, a dispatch command is queued, and a
/// progress notification fires.
#[tokio::test]
async fn completing_a_dependency_unblocks_the_next_issue() {
    let mut hx = harness();
    hx.engine
        .projects()
        .upsert(chain_project("proj-1", "ENG-100", "ENG-101"))
        .unwrap();

    hx.engine.cascade_completed("proj-1", "ENG-100").await;

    let project = hx.engine.projects().get("proj-1").unwrap().unwrap();
    assert_eq!(
        project.issues["ENG-101"].dispatch_status,
        IssueDispatchStatus::Dispatched
    );

    let queued = hx.dispatch_rx.try_recv().unwrap();
    assert_eq!(queued.issue_id, "issue-eng-101");
    assert_eq!(queued.request.project.as_deref(), Some("proj-1"));

    assert!(hx
        .notified()
        .iter()
        .any(|n| n.contains("Project progress")));
}

/// A dispatch completing through the full pipeline fires the cascade on
/// its own (project-scoped dispatches carry the project id).
#[tokio::test]
async fn audit_pass_on_project_dispatch_triggers_cascade() {
    let mut hx = harness();
    hx.seed_issue("issue-eng-100", "ENG-100");
    hx.engine
        .projects()
        .upsert(chain_project("proj-2", "ENG-100", "ENG-101"))
        .unwrap();

    hx.runner.push_success("work");
    hx.runner.push_success(&passing_verdict_output());
    hx.engine
        .start_and_drive(
            "issue-eng-100",
            claw_engine::runtime::DispatchRequest {
                project: Some("proj-2".to_string()),
                ..claw_engine::runtime::DispatchRequest::default()
            },
        )
        .await
        .unwrap();

    let project = hx.engine.projects().get("proj-2").unwrap().unwrap();
    assert_eq!(
        project.issues["ENG-100"].dispatch_status,
        IssueDispatchStatus::Done
    );
    assert_eq!(
        project.issues["ENG-101"].dispatch_status,
        IssueDispatchStatus::Dispatched
    );
    assert!(hx.dispatch_rx.try_recv().is_ok());
}
