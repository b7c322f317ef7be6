// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker phase: run the implementing agent inside the dispatch worktree.

use super::{Engine, EngineError, SpawnOptions, StatePick};
use crate::notifier::{NotifyKind, NotifyPayload};
use claw_adapters::runner::AgentRunner;
use claw_adapters::tracker::TrackerAdapter;
use claw_adapters::worktree::WorktreeAdapter;
use claw_core::clock::Clock;
use claw_core::dispatch::{ActiveDispatch, DispatchStatus, SessionMapping, SessionPhase};
use claw_core::{SessionKey, Verdict};
use claw_storage::state::TransitionUpdates;

/// Reason recorded when the runner's own retry also hit the watchdog.
pub const WATCHDOG_STUCK_REASON: &str = "watchdog_kill_2x";

impl<T, R, W, C> Engine<T, R, W, C>
where
    T: TrackerAdapter,
    R: AgentRunner,
    W: WorktreeAdapter,
    C: Clock,
{
    /// Run the worker for `dispatch` and hand off to the audit.
    ///
    /// Fresh dispatches are CASed `dispatched → working`; rework callers
    /// already placed the dispatch in `working` with the attempt bumped.
    pub async fn spawn_worker(
        &self,
        dispatch: &ActiveDispatch,
        opts: SpawnOptions,
    ) -> Result<(), EngineError> {
        let id = dispatch.issue_identifier.as_str();
        let worker_key = SessionKey::generate();

        let dispatch = if dispatch.status == DispatchStatus::Dispatched {
            match self.store.transition(
                id,
                DispatchStatus::Dispatched,
                DispatchStatus::Working,
                TransitionUpdates {
                    worker_session_key: Some(worker_key.clone()),
                    ..TransitionUpdates::default()
                },
            ) {
                Ok(updated) => updated,
                Err(e) => {
                    self.log_cas_rejection("spawn_worker", &e);
                    return Ok(());
                }
            }
        } else {
            self.store.record_worker_session(id, &worker_key)?;
            let mut d = dispatch.clone();
            d.worker_session_key = Some(worker_key.clone());
            d
        };

        let issue = self.tracker.get_issue_details(&dispatch.issue_id).await?;

        let prompts = self.prompts.for_worktree(&dispatch.worktree_path);
        let vars = self.prompt_vars(&dispatch, &issue, &opts.gaps);
        let prompt = prompts.render_worker(&vars);

        self.store.register_session_mapping(
            &worker_key,
            SessionMapping {
                dispatch_id: id.to_string(),
                phase: SessionPhase::Worker,
                attempt: dispatch.attempt,
            },
        )?;

        let artifacts = self.artifacts(&dispatch);
        artifacts.update_manifest("working", dispatch.attempt, self.now_ms());

        self.notifier
            .notify(
                NotifyKind::Working,
                &NotifyPayload {
                    identifier: issue.identifier.clone(),
                    title: issue.title.clone(),
                    status: "working".to_string(),
                    attempt: Some(dispatch.attempt),
                    ..NotifyPayload::default()
                },
            )
            .await;

        let request = self.run_request(&dispatch, &worker_key, prompt);
        let result = match self.runner.run(request).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(id, error = %e, "worker runner failed");
                self.fail_dispatch(&dispatch, &issue, &format!("worker could not run: {e}"))
                    .await;
                return Ok(());
            }
        };

        artifacts.write_worker_output(dispatch.attempt, &result.output);
        artifacts.append_log(
            "worker",
            dispatch.attempt,
            if result.watchdog_killed { "watchdog killed" } else { "finished" },
            self.now_ms(),
        );

        if result.watchdog_killed {
            self.handle_watchdog_kill(&dispatch, &issue).await;
            return Ok(());
        }

        // Concurrent mutations are possible while the worker runs; act on
        // fresh state or not at all.
        let Some(fresh) = self.store.get_active(id)? else {
            tracing::info!(id, "dispatch vanished during worker run; aborting");
            return Ok(());
        };

        self.trigger_audit(&fresh, &worker_key).await
    }

    /// The runner already retried once; a second kill escalates to a human.
    async fn handle_watchdog_kill(
        &self,
        dispatch: &ActiveDispatch,
        issue: &claw_adapters::tracker::IssueDetails,
    ) {
        let id = dispatch.issue_identifier.as_str();
        let artifacts = self.artifacts(dispatch);
        artifacts.update_manifest("stuck", dispatch.attempt, self.now_ms());

        if let Err(e) = self.store.transition(
            id,
            DispatchStatus::Working,
            DispatchStatus::Stuck,
            TransitionUpdates::stuck(WATCHDOG_STUCK_REASON),
        ) {
            self.log_cas_rejection("watchdog_kill", &e);
            return;
        }

        self.move_issue_to(issue, StatePick::Triage).await;
        self.post_comment(
            &issue.id,
            &format!(
                "## Agent Timed Out\n\nThe worker on {} produced no output within the \
                 watchdog bounds and was stopped twice.\n\nOptions:\n\
                 - Retry with a comment asking for another attempt\n\
                 - Break the issue into smaller pieces\n\
                 - Take it over manually",
                issue.identifier
            ),
            self.config.default_agent_id.as_deref(),
        )
        .await;

        self.notifier
            .notify(
                NotifyKind::WatchdogKill,
                &NotifyPayload {
                    identifier: issue.identifier.clone(),
                    title: issue.title.clone(),
                    status: "stuck".to_string(),
                    attempt: Some(dispatch.attempt),
                    reason: Some("no output before the watchdog bound, killed twice".to_string()),
                    ..NotifyPayload::default()
                },
            )
            .await;

        self.end_run(&dispatch.issue_id);
    }

    /// Infrastructure failure mid-pipeline: terminal `failed`, user told.
    pub(crate) async fn fail_dispatch(
        &self,
        dispatch: &ActiveDispatch,
        issue: &claw_adapters::tracker::IssueDetails,
        reason: &str,
    ) {
        let id = dispatch.issue_identifier.as_str();
        if let Err(e) = self.store.transition(
            id,
            dispatch.status,
            DispatchStatus::Failed,
            TransitionUpdates::default(),
        ) {
            self.log_cas_rejection("fail_dispatch", &e);
            return;
        }
        let record = claw_core::dispatch::CompletedDispatch {
            issue_identifier: id.to_string(),
            tier: dispatch.tier,
            status: claw_core::dispatch::CompletedStatus::Failed,
            completed_at: self.now_ms(),
            pr_url: None,
            project: dispatch.project.clone(),
            total_attempts: dispatch.attempt + 1,
        };
        if let Err(e) = self.store.complete_dispatch(id, record) {
            tracing::error!(id, error = %e, "could not record failed dispatch");
        }
        self.post_comment(
            &issue.id,
            &format!("Dispatch failed on {}: {}", issue.identifier, reason),
            self.config.default_agent_id.as_deref(),
        )
        .await;
        self.notifier
            .notify(
                NotifyKind::Stuck,
                &NotifyPayload {
                    identifier: issue.identifier.clone(),
                    title: issue.title.clone(),
                    status: "failed".to_string(),
                    reason: Some(reason.to_string()),
                    ..NotifyPayload::default()
                },
            )
            .await;
        self.end_run(&dispatch.issue_id);
    }

    /// Gap list of the most recent failed audit, read back from artifacts.
    pub(crate) fn last_gaps(&self, dispatch: &ActiveDispatch) -> Vec<String> {
        if dispatch.attempt == 0 {
            return Vec::new();
        }
        let path = self
            .artifacts(dispatch)
            .dir()
            .join(format!("audit-{}.json", dispatch.attempt - 1));
        std::fs::read_to_string(path)
            .ok()
            .and_then(|raw| serde_json::from_str::<Verdict>(&raw).ok())
            .map(|v| v.gaps)
            .unwrap_or_default()
    }
}
