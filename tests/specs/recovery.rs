//! Restart recovery and state-file resilience specs.

use super::prelude::*;
use claw_core::test_support::recoverable_dispatch;
use claw_core::CompletedStatus;

/// A crash between worker completion and audit trigger leaves a
/// `working` dispatch with a worker key and no audit key; recovery
/// re-triggers the audit and the dispatch completes.
#[tokio::test]
async fn recovery_resumes_orphaned_working_dispatch() {
    let hx = harness();
    hx.seed_issue("issue-uuid-1", "ENG-REC");

    let mut dispatch = recoverable_dispatch("ENG-REC");
    dispatch.worktree_path = hx.dir.path().join("worktrees/eng-rec");
    std::fs::create_dir_all(&dispatch.worktree_path).unwrap();
    hx.engine.store().register_dispatch(dispatch).unwrap();

    hx.runner.push_success(&passing_verdict_output());
    let recovered = hx.engine.recover().await.unwrap();
    assert_eq!(recovered, 1);

    let state = hx.engine.store().read().unwrap();
    assert_eq!(
        state.dispatches.completed["ENG-REC"].status,
        CompletedStatus::Done
    );
}

/// A corrupt state file is quarantined, the daemon starts fresh, and the
/// quarantined copy stays on disk for inspection.
#[tokio::test]
async fn corrupt_state_file_quarantines_and_continues() {
    let hx = harness();
    std::fs::write(hx.engine.store().path(), "not a state file").unwrap();

    assert!(hx.engine.store().read().unwrap().dispatches.active.is_empty());

    let quarantined = std::fs::read_dir(hx.dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .any(|e| e.file_name().to_string_lossy().contains(".corrupted."));
    assert!(quarantined);

    // The store keeps working afterwards.
    hx.seed_issue("issue-1", "ENG-1");
    hx.engine
        .start_and_drive("issue-1", claw_engine::runtime::DispatchRequest::default())
        .await
        .unwrap();
    assert!(!hx.engine.store().read().unwrap().dispatches.completed.is_empty());
}
