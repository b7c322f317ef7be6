// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Git worktree contract: per-dispatch working copies and PR creation.

use crate::subprocess::run_with_timeout;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

const GIT_TIMEOUT: Duration = Duration::from_secs(60);
const PR_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum WorktreeError {
    #[error("git operation failed: {0}")]
    Git(String),

    #[error("pull request creation failed: {0}")]
    PullRequest(String),
}

/// A created (or resumed) worktree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeInfo {
    pub path: PathBuf,
    pub branch: String,
    /// True when the worktree already existed for this branch.
    pub resumed: bool,
}

/// Outcome of preparing a workspace for an agent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspacePrep {
    pub pulled: bool,
    pub submodules_initialized: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorktreeStatus {
    pub last_commit: Option<String>,
    pub has_changes: bool,
}

/// The git/PR surface the pipeline consumes.
#[async_trait]
pub trait WorktreeAdapter: Send + Sync + 'static {
    async fn create_worktree(&self, base: &Path, branch: &str)
        -> Result<WorktreeInfo, WorktreeError>;

    async fn prepare_workspace(&self, path: &Path) -> Result<WorkspacePrep, WorktreeError>;

    async fn worktree_status(&self, path: &Path) -> Result<WorktreeStatus, WorktreeError>;

    async fn create_pull_request(
        &self,
        path: &Path,
        title: &str,
        body: &str,
    ) -> Result<String, WorktreeError>;

    /// Paths of all worktrees managed for dispatches.
    async fn list_worktrees(&self) -> Result<Vec<PathBuf>, WorktreeError>;

    async fn remove_worktree(&self, path: &Path, force: bool) -> Result<(), WorktreeError>;
}

/// Shell-out implementation over `git` and `gh`.
pub struct GitWorktreeAdapter {
    /// Directory that receives the per-dispatch worktrees.
    worktrees_root: PathBuf,
}

impl GitWorktreeAdapter {
    pub fn new(worktrees_root: impl Into<PathBuf>) -> Self {
        Self { worktrees_root: worktrees_root.into() }
    }

    async fn git(&self, cwd: &Path, args: &[&str]) -> Result<String, WorktreeError> {
        let mut cmd = Command::new("git");
        cmd.current_dir(cwd).args(args);
        let output = run_with_timeout(cmd, GIT_TIMEOUT, "git")
            .await
            .map_err(WorktreeError::Git)?;
        if !output.status.success() {
            return Err(WorktreeError::Git(format!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl WorktreeAdapter for GitWorktreeAdapter {
    async fn create_worktree(
        &self,
        base: &Path,
        branch: &str,
    ) -> Result<WorktreeInfo, WorktreeError> {
        let dir_name = branch.replace('/', "-");
        let path = self.worktrees_root.join(dir_name);
        if path.exists() {
            return Ok(WorktreeInfo { path, branch: branch.to_string(), resumed: true });
        }
        let path_str = path.display().to_string();
        self.git(base, &["worktree", "add", "-B", branch, &path_str])
            .await?;
        Ok(WorktreeInfo { path, branch: branch.to_string(), resumed: false })
    }

    async fn prepare_workspace(&self, path: &Path) -> Result<WorkspacePrep, WorktreeError> {
        let mut prep = WorkspacePrep::default();
        match self.git(path, &["pull", "--ff-only"]).await {
            Ok(_) => prep.pulled = true,
            Err(e) => prep.errors.push(e.to_string()),
        }
        match self
            .git(path, &["submodule", "update", "--init", "--recursive"])
            .await
        {
            Ok(_) => prep.submodules_initialized = true,
            Err(e) => prep.errors.push(e.to_string()),
        }
        Ok(prep)
    }

    async fn worktree_status(&self, path: &Path) -> Result<WorktreeStatus, WorktreeError> {
        let last_commit = self
            .git(path, &["log", "-1", "--format=%H"])
            .await
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let porcelain = self.git(path, &["status", "--porcelain"]).await?;
        Ok(WorktreeStatus { last_commit, has_changes: !porcelain.trim().is_empty() })
    }

    async fn create_pull_request(
        &self,
        path: &Path,
        title: &str,
        body: &str,
    ) -> Result<String, WorktreeError> {
        self.git(path, &["push", "--set-upstream", "origin", "HEAD"])
            .await
            .map_err(|e| WorktreeError::PullRequest(e.to_string()))?;

        let mut cmd = Command::new("gh");
        cmd.current_dir(path)
            .args(["pr", "create", "--title", title, "--body", body]);
        let output = run_with_timeout(cmd, PR_TIMEOUT, "gh pr create")
            .await
            .map_err(WorktreeError::PullRequest)?;
        if !output.status.success() {
            return Err(WorktreeError::PullRequest(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        // `gh` prints the PR URL as the last stdout line.
        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .lines()
            .rev()
            .find(|l| l.starts_with("http"))
            .map(|l| l.trim().to_string())
            .ok_or_else(|| WorktreeError::PullRequest("no PR URL in gh output".to_string()))
    }

    async fn list_worktrees(&self) -> Result<Vec<PathBuf>, WorktreeError> {
        let entries = match std::fs::read_dir(&self.worktrees_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(WorktreeError::Git(e.to_string())),
        };
        Ok(entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect())
    }

    async fn remove_worktree(&self, path: &Path, force: bool) -> Result<(), WorktreeError> {
        // `worktree remove` refuses to run from inside the tree being
        // removed, so resolve the owning repository first.
        let common = self
            .git(path, &["rev-parse", "--path-format=absolute", "--git-common-dir"])
            .await?;
        let repo = PathBuf::from(common.trim())
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| WorktreeError::Git("could not resolve owning repository".into()))?;

        let path_str = path.display().to_string();
        let mut args = vec!["worktree", "remove"];
        if force {
            args.push("--force");
        }
        args.push(&path_str);
        self.git(&repo, &args).await.map(|_| ())
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeWorktreeState {
        created: Vec<WorktreeInfo>,
        pr_urls: Vec<String>,
        has_commits: bool,
        pr_fails: bool,
    }

    /// Worktrees under a temp root, no git involved.
    #[derive(Clone, Default)]
    pub struct FakeWorktreeAdapter {
        state: Arc<Mutex<FakeWorktreeState>>,
        root: Arc<Mutex<Option<PathBuf>>>,
    }

    impl FakeWorktreeAdapter {
        pub fn new(root: impl Into<PathBuf>) -> Self {
            let adapter = Self::default();
            *adapter.root.lock() = Some(root.into());
            adapter
        }

        /// Make `worktree_status` report a commit so PR creation runs.
        pub fn with_commits(self) -> Self {
            self.state.lock().has_commits = true;
            self
        }

        pub fn with_pr_failing(self) -> Self {
            self.state.lock().pr_fails = true;
            self
        }

        pub fn created(&self) -> Vec<WorktreeInfo> {
            self.state.lock().created.clone()
        }

        pub fn pr_urls(&self) -> Vec<String> {
            self.state.lock().pr_urls.clone()
        }
    }

    #[async_trait]
    impl WorktreeAdapter for FakeWorktreeAdapter {
        async fn create_worktree(
            &self,
            _base: &Path,
            branch: &str,
        ) -> Result<WorktreeInfo, WorktreeError> {
            let root = self
                .root
                .lock()
                .clone()
                .unwrap_or_else(std::env::temp_dir);
            let path = root.join(branch.replace('/', "-"));
            let resumed = path.exists();
            std::fs::create_dir_all(&path)
                .map_err(|e| WorktreeError::Git(e.to_string()))?;
            let info = WorktreeInfo { path, branch: branch.to_string(), resumed };
            self.state.lock().created.push(info.clone());
            Ok(info)
        }

        async fn prepare_workspace(&self, _path: &Path) -> Result<WorkspacePrep, WorktreeError> {
            Ok(WorkspacePrep { pulled: true, submodules_initialized: true, errors: Vec::new() })
        }

        async fn worktree_status(&self, _path: &Path) -> Result<WorktreeStatus, WorktreeError> {
            let has = self.state.lock().has_commits;
            Ok(WorktreeStatus {
                last_commit: has.then(|| "abc123".to_string()),
                has_changes: false,
            })
        }

        async fn create_pull_request(
            &self,
            _path: &Path,
            title: &str,
            _body: &str,
        ) -> Result<String, WorktreeError> {
            let mut state = self.state.lock();
            if state.pr_fails {
                return Err(WorktreeError::PullRequest("remote rejected".to_string()));
            }
            let url = format!("https://git.example/pr/{}", state.pr_urls.len() + 1);
            state.pr_urls.push(url.clone());
            tracing::debug!(title, url = %url, "fake PR created");
            Ok(url)
        }

        async fn list_worktrees(&self) -> Result<Vec<PathBuf>, WorktreeError> {
            Ok(self.state.lock().created.iter().map(|w| w.path.clone()).collect())
        }

        async fn remove_worktree(&self, path: &Path, _force: bool) -> Result<(), WorktreeError> {
            let _ = std::fs::remove_dir_all(path);
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeWorktreeAdapter;

#[cfg(test)]
#[path = "worktree_tests.rs"]
mod tests;
