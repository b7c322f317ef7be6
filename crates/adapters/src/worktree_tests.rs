// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn fake_creates_directory_and_reports_resume() {
    let root = tempfile::tempdir().unwrap();
    let adapter = FakeWorktreeAdapter::new(root.path());

    let first = adapter
        .create_worktree(Path::new("/repo"), "claw/eng-1")
        .await
        .unwrap();
    assert!(first.path.exists());
    assert!(!first.resumed);
    assert_eq!(first.branch, "claw/eng-1");

    let second = adapter
        .create_worktree(Path::new("/repo"), "claw/eng-1")
        .await
        .unwrap();
    assert!(second.resumed);
}

#[tokio::test]
async fn fake_status_reflects_commit_flag() {
    let root = tempfile::tempdir().unwrap();
    let bare = FakeWorktreeAdapter::new(root.path());
    assert!(bare
        .worktree_status(root.path())
        .await
        .unwrap()
        .last_commit
        .is_none());

    let with_commits = FakeWorktreeAdapter::new(root.path()).with_commits();
    assert!(with_commits
        .worktree_status(root.path())
        .await
        .unwrap()
        .last_commit
        .is_some());
}

#[tokio::test]
async fn fake_pr_failure_is_an_error_not_a_panic() {
    let root = tempfile::tempdir().unwrap();
    let adapter = FakeWorktreeAdapter::new(root.path()).with_pr_failing();
    let err = adapter
        .create_pull_request(root.path(), "t", "b")
        .await
        .unwrap_err();
    assert!(matches!(err, WorktreeError::PullRequest(_)));
}

#[test]
fn branch_names_map_to_flat_directories() {
    // Mirrors GitWorktreeAdapter's path derivation.
    assert_eq!("claw/eng-1".replace('/', "-"), "claw-eng-1");
}
