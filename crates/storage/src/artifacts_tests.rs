// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn verdict(pass: bool, gaps: &[&str]) -> Verdict {
    Verdict {
        pass,
        criteria: vec!["builds cleanly".to_string()],
        gaps: gaps.iter().map(|s| s.to_string()).collect(),
        test_results: "42 passed".to_string(),
    }
}

#[test]
fn manifest_worker_and_audit_files_land_in_claw_dir() {
    let worktree = tempfile::tempdir().unwrap();
    let writer = ArtifactWriter::new(worktree.path());

    writer.update_manifest("working", 0, 1000);
    writer.write_worker_output(0, "Implemented fix.");
    writer.write_audit_verdict(0, &verdict(true, &[]));
    writer.append_log("worker", 0, "worker finished", 1000);

    let dir = worktree.path().join(DISPATCH_DIR);
    assert!(dir.join("manifest.json").exists());
    assert!(dir.join("worker-0.md").exists());
    assert!(dir.join("audit-0.json").exists());
    assert!(dir.join("log.jsonl").exists());

    let manifest: Manifest =
        serde_json::from_str(&std::fs::read_to_string(dir.join("manifest.json")).unwrap()).unwrap();
    assert_eq!(manifest.status, "working");
}

#[test]
fn log_is_append_only_jsonl() {
    let worktree = tempfile::tempdir().unwrap();
    let writer = ArtifactWriter::new(worktree.path());
    writer.append_log("worker", 0, "started", 1);
    writer.append_log("audit", 0, "started", 2);

    let raw =
        std::fs::read_to_string(worktree.path().join(DISPATCH_DIR).join("log.jsonl")).unwrap();
    let lines: Vec<&str> = raw.lines().collect();
    assert_eq!(lines.len(), 2);
    for line in lines {
        let entry: serde_json::Value = serde_json::from_str(line).unwrap();
        assert!(entry["phase"].is_string());
    }
}

#[test]
fn failures_do_not_panic_or_error() {
    // Point the writer at a path that cannot be a directory.
    let file = tempfile::NamedTempFile::new().unwrap();
    let writer = ArtifactWriter::new(file.path());
    writer.update_manifest("working", 0, 1000);
    writer.write_worker_output(0, "output");
    writer.append_log("worker", 0, "detail", 1000);
}

#[test]
fn summary_built_from_attempt_artifacts() {
    let worktree = tempfile::tempdir().unwrap();
    let writer = ArtifactWriter::new(worktree.path());
    writer.update_manifest("done", 2, 1000);
    writer.write_audit_verdict(0, &verdict(false, &["missing tests"]));
    writer.write_audit_verdict(1, &verdict(true, &[]));

    let summary = build_summary_from_artifacts(worktree.path()).unwrap();
    assert!(summary.contains("Status: done"));
    assert!(summary.contains("Attempt 1"));
    assert!(summary.contains("missing tests"));
    assert!(summary.contains("Attempt 2"));
    assert!(worktree.path().join(DISPATCH_DIR).join("summary.md").exists());
}

#[test]
fn summary_of_empty_worktree_is_none() {
    let worktree = tempfile::tempdir().unwrap();
    assert!(build_summary_from_artifacts(worktree.path()).is_none());
}
