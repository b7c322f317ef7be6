// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestration around the pipeline: dispatch startup, the rework loop,
//! crash recovery, in-memory guards, and supervised background tasks.

use crate::pipeline::{Engine, EngineError, SpawnOptions};
use claw_adapters::runner::AgentRunner;
use claw_adapters::tracker::TrackerAdapter;
use claw_adapters::worktree::WorktreeAdapter;
use claw_core::clock::Clock;
use claw_core::dispatch::{ActiveDispatch, DispatchStatus, Tier};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Default age after which a never-started dispatch is reclaimed.
pub const STALE_DISPATCH_MAX_AGE_MS: u64 = 24 * 60 * 60 * 1000;

/// Default retention for completed dispatch records.
pub const COMPLETED_RETENTION_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// Spawn a detached task whose panic or abort is logged, never lost.
pub fn spawn_supervised<F>(name: &'static str, fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let handle = tokio::spawn(fut);
    tokio::spawn(async move {
        if let Err(e) = handle.await {
            tracing::error!(task = name, error = %e, "background task died");
        }
    });
}

/// Parameters for starting one dispatch.
#[derive(Debug, Clone, Default)]
pub struct DispatchRequest {
    /// Agent backend to run; defaults to the configured default agent.
    pub agent_id: Option<String>,
    pub tier: Option<Tier>,
    pub model: Option<String>,
    /// Project id for DAG-scoped dispatches.
    pub project: Option<String>,
}

/// A dispatch queued for the runtime loop (DAG unblocks, reruns).
#[derive(Debug, Clone)]
pub struct DispatchCommand {
    pub issue_id: String,
    pub request: DispatchRequest,
}

/// Consume queued dispatch commands, running each on a supervised task.
pub async fn run_dispatch_loop<T, R, W, C>(
    engine: Arc<Engine<T, R, W, C>>,
    mut rx: mpsc::UnboundedReceiver<DispatchCommand>,
) where
    T: TrackerAdapter,
    R: AgentRunner,
    W: WorktreeAdapter,
    C: Clock,
{
    while let Some(command) = rx.recv().await {
        let engine = Arc::clone(&engine);
        spawn_supervised("queued-dispatch", async move {
            if let Err(e) = engine
                .start_and_drive(&command.issue_id, command.request)
                .await
            {
                tracing::error!(issue_id = %command.issue_id, error = %e, "queued dispatch failed");
            }
        });
    }
}

/// Removes the active-run marker when a handler ends, however it ends.
struct RunMarker<'a, T, R, W, C>
where
    T: TrackerAdapter,
    R: AgentRunner,
    W: WorktreeAdapter,
    C: Clock,
{
    engine: &'a Engine<T, R, W, C>,
    issue_id: String,
}

impl<T, R, W, C> Drop for RunMarker<'_, T, R, W, C>
where
    T: TrackerAdapter,
    R: AgentRunner,
    W: WorktreeAdapter,
    C: Clock,
{
    fn drop(&mut self) {
        self.engine.end_run(&self.issue_id);
    }
}

impl<T, R, W, C> Engine<T, R, W, C>
where
    T: TrackerAdapter,
    R: AgentRunner,
    W: WorktreeAdapter,
    C: Clock,
{
    // ---- active-run guard -------------------------------------------------

    /// Claim the issue for this handler. False means someone owns it.
    pub fn begin_run(&self, issue_id: &str) -> bool {
        self.active_runs.lock().insert(issue_id.to_string())
    }

    /// Cheap pre-flight check; runs before any async I/O in the router.
    pub fn owns_run(&self, issue_id: &str) -> bool {
        self.active_runs.lock().contains(issue_id)
    }

    pub fn end_run(&self, issue_id: &str) {
        self.active_runs.lock().remove(issue_id);
    }

    // ---- in-memory TTL dedup ---------------------------------------------

    /// True when `key` fired within the TTL window; otherwise records it.
    pub fn seen_recently(&self, key: &str) -> bool {
        let now = self.now_ms();
        let mut map = self.recently_processed.lock();
        if map.get(key).is_some_and(|&expiry| expiry > now) {
            return true;
        }
        map.insert(key.to_string(), now + self.config.dedup_ttl_ms);
        false
    }

    /// Drop expired entries; called on the sweep interval.
    pub fn sweep_dedup(&self) -> usize {
        let now = self.now_ms();
        let mut map = self.recently_processed.lock();
        let before = map.len();
        map.retain(|_, &mut expiry| expiry > now);
        before - map.len()
    }

    // ---- dispatch lifecycle ----------------------------------------------

    pub(crate) fn queue_dispatch(&self, command: DispatchCommand) {
        if self.dispatch_tx.send(command).is_err() {
            tracing::warn!("dispatch queue receiver is gone; command dropped");
        }
    }

    /// Start a dispatch and run it to a terminal state (including the
    /// rework loop). The single entry point for webhook handlers and the
    /// dispatch queue.
    pub async fn start_and_drive(
        &self,
        issue_id: &str,
        request: DispatchRequest,
    ) -> Result<(), EngineError> {
        if !self.begin_run(issue_id) {
            tracing::info!(issue_id, "issue already owned by another handler");
            return Ok(());
        }
        let _marker = RunMarker { engine: self, issue_id: issue_id.to_string() };

        let Some(dispatch) = self.start_dispatch(issue_id, request).await? else {
            return Ok(());
        };
        self.drive(dispatch).await
    }

    /// Create the worktree and register the dispatch. Returns `None` (with
    /// a user-visible comment) when startup fails; no active dispatch
    /// persists in that case.
    pub async fn start_dispatch(
        &self,
        issue_id: &str,
        request: DispatchRequest,
    ) -> Result<Option<ActiveDispatch>, EngineError> {
        let issue = self.tracker.get_issue_details(issue_id).await?;
        let identifier = issue.identifier.clone();

        if self.store.get_active(&identifier)?.is_some() {
            tracing::info!(identifier, "dispatch already active; ignoring");
            return Ok(None);
        }

        let Some(repo) = self.repo_for_team(&issue.team.key) else {
            self.post_comment(
                &issue.id,
                &format!(
                    "Dispatch failed on {identifier}: no repository configured for team {}",
                    issue.team.key
                ),
                self.config.default_agent_id.as_deref(),
            )
            .await;
            return Ok(None);
        };

        let branch = format!("claw/{}", identifier.to_lowercase());
        let worktree = match self.worktree.create_worktree(&repo, &branch).await {
            Ok(info) => info,
            Err(e) => {
                tracing::error!(identifier, error = %e, "worktree creation failed");
                self.post_comment(
                    &issue.id,
                    &format!("Dispatch failed on {identifier}: could not prepare a worktree ({e})"),
                    self.config.default_agent_id.as_deref(),
                )
                .await;
                return Ok(None);
            }
        };

        match self.worktree.prepare_workspace(&worktree.path).await {
            Ok(prep) => {
                for error in &prep.errors {
                    tracing::warn!(identifier, error, "workspace preparation issue");
                }
            }
            Err(e) => tracing::warn!(identifier, error = %e, "workspace preparation failed"),
        }

        let tier = request.tier.unwrap_or_default();
        let dispatch = ActiveDispatch {
            issue_identifier: identifier.clone(),
            issue_id: issue.id.clone(),
            worktree_path: worktree.path.clone(),
            branch: worktree.branch.clone(),
            tier,
            model: request.model.unwrap_or_else(|| default_model(tier).to_string()),
            status: DispatchStatus::Dispatched,
            dispatched_at: self.now_ms(),
            attempt: 0,
            agent_id: request.agent_id,
            worker_session_key: None,
            audit_session_key: None,
            stuck_reason: None,
            project: request.project,
            worktrees: Vec::new(),
        };
        if let Err(e) = self.store.register_dispatch(dispatch.clone()) {
            // Lost a registration race; the winner owns the issue.
            tracing::info!(identifier, error = %e, "dispatch registration rejected");
            return Ok(None);
        }

        self.notifier
            .notify(
                crate::notifier::NotifyKind::Dispatch,
                &crate::notifier::NotifyPayload {
                    identifier: identifier.clone(),
                    title: issue.title.clone(),
                    status: "dispatched".to_string(),
                    ..crate::notifier::NotifyPayload::default()
                },
            )
            .await;

        Ok(Some(dispatch))
    }

    /// Run the pipeline until the dispatch leaves `working`, re-invoking
    /// the worker with the gap list after each rework transition.
    pub async fn drive(&self, mut dispatch: ActiveDispatch) -> Result<(), EngineError> {
        let id = dispatch.issue_identifier.clone();
        let mut gaps: Vec<String> = Vec::new();

        // First attempt plus the rework budget bounds the loop.
        for _ in 0..=self.config.max_rework_attempts + 1 {
            self.spawn_worker(&dispatch, SpawnOptions { gaps: gaps.clone() })
                .await?;

            let Some(fresh) = self.store.get_active(&id)? else {
                return Ok(()); // reached a terminal state and moved out
            };
            let rework_requested =
                fresh.status == DispatchStatus::Working && fresh.attempt > dispatch.attempt;
            if !rework_requested {
                return Ok(());
            }
            gaps = self.last_gaps(&fresh);
            dispatch = fresh;
        }
        tracing::error!(id, "rework loop exceeded its bound; leaving dispatch as-is");
        Ok(())
    }

    fn repo_for_team(&self, team_key: &str) -> Option<std::path::PathBuf> {
        if let Some(repo_name) = self.config.team_mappings.get(team_key) {
            if let Some(repo) = self.config.repos.get(repo_name) {
                return Some(repo.path.clone());
            }
            tracing::warn!(team_key, repo_name, "team mapping points at unknown repo");
        }
        if self.config.repos.len() == 1 {
            return self.config.repos.values().next().map(|r| r.path.clone());
        }
        None
    }

    // ---- recovery and maintenance ----------------------------------------

    /// Resume dispatches whose worker finished but whose audit never ran
    /// (crash between the phases). Called once at startup.
    pub async fn recover(&self) -> Result<usize, EngineError> {
        let recoverable = self.store.list_recoverable_dispatches()?;
        let count = recoverable.len();
        for dispatch in recoverable {
            let Some(worker_key) = dispatch.worker_session_key.clone() else {
                continue;
            };
            tracing::info!(
                id = %dispatch.issue_identifier,
                "recovering dispatch: re-triggering audit"
            );
            if let Err(e) = self.trigger_audit(&dispatch, &worker_key).await {
                tracing::error!(
                    id = %dispatch.issue_identifier,
                    error = %e,
                    "recovery audit failed"
                );
            }
        }
        Ok(count)
    }

    /// Reclaim dispatches that never left `dispatched` (startup died
    /// before the worker ran). Best-effort comment, entry removed.
    pub async fn reclaim_stale(&self, max_age_ms: u64) -> Result<usize, EngineError> {
        let stale = self.store.list_stale_dispatches(max_age_ms, self.now_ms())?;
        let mut reclaimed = 0;
        for dispatch in stale {
            if dispatch.status != DispatchStatus::Dispatched {
                continue;
            }
            tracing::warn!(id = %dispatch.issue_identifier, "reclaiming stale dispatch");
            self.store.remove_active_dispatch(&dispatch.issue_identifier)?;
            self.post_comment(
                &dispatch.issue_id,
                &format!(
                    "Dispatch on {} never started and was reclaimed; comment to retry.",
                    dispatch.issue_identifier
                ),
                self.config.default_agent_id.as_deref(),
            )
            .await;
            reclaimed += 1;
        }
        Ok(reclaimed)
    }

    /// Age out completed dispatch records.
    pub fn prune_completed(&self) -> Result<usize, EngineError> {
        Ok(self
            .store
            .prune_completed(COMPLETED_RETENTION_MS, self.now_ms())?)
    }

    /// Make sure the tracker delivers webhooks to the configured URL.
    pub async fn ensure_webhook(&self) {
        let Some(url) = self.config.webhook_url.clone() else {
            return;
        };
        let hooks = match self.tracker.list_webhooks().await {
            Ok(hooks) => hooks,
            Err(e) => {
                tracing::warn!(error = %e, "could not list tracker webhooks");
                return;
            }
        };
        if hooks.iter().any(|h| h.url == url) {
            tracing::debug!(url, "tracker webhook already registered");
            return;
        }
        match self.tracker.create_webhook(&url).await {
            Ok(hook) => tracing::info!(url, id = %hook.id, "registered tracker webhook"),
            Err(e) => tracing::warn!(url, error = %e, "webhook registration failed"),
        }
    }

    // ---- comment-driven operations ---------------------------------------

    /// Close an issue on user request, with a short report comment.
    pub async fn close_issue(&self, issue_id: &str, reason: &str) -> Result<(), EngineError> {
        let issue = self.tracker.get_issue_details(issue_id).await?;
        self.move_issue_to(&issue, crate::pipeline::StatePick::Completed)
            .await;
        self.post_comment(
            issue_id,
            &format!("Closing {}: {}", issue.identifier, reason),
            self.config.default_agent_id.as_deref(),
        )
        .await;
        Ok(())
    }

    /// Best-effort triage of a freshly created issue: suggest team labels
    /// whose names appear in the issue text.
    pub async fn auto_triage(&self, issue_id: &str) {
        let issue = match self.tracker.get_issue_details(issue_id).await {
            Ok(issue) => issue,
            Err(e) => {
                tracing::warn!(issue_id, error = %e, "triage could not load issue");
                return;
            }
        };
        let labels = match self.tracker.get_team_labels(&issue.team.id).await {
            Ok(labels) => labels,
            Err(e) => {
                tracing::warn!(issue_id, error = %e, "triage could not load labels");
                return;
            }
        };

        let haystack = format!("{} {}", issue.title, issue.description).to_lowercase();
        let matched: Vec<&str> = labels
            .iter()
            .filter(|l| haystack.contains(&l.name.to_lowercase()))
            .map(|l| l.name.as_str())
            .collect();

        let body = if matched.is_empty() {
            format!(
                "Triage: no label suggestions for {}; waiting for a human look.",
                issue.identifier
            )
        } else {
            format!(
                "Triage: {} looks related to {}.",
                issue.identifier,
                matched.join(", ")
            )
        };
        self.post_comment(&issue.id, &body, self.config.default_agent_id.as_deref())
            .await;
    }
}

fn default_model(tier: Tier) -> &'static str {
    match tier {
        Tier::Small => "sonnet-mini",
        Tier::Medium => "sonnet",
        Tier::High => "opus",
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
