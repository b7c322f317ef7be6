// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Audit phase: independent review of the worker's output and landing of
//! the verdict.
//!
//! The audit runs as a separate agent process with its own session key.
//! Self-certification is forbidden: the worker's session is never reused.

use super::{Engine, EngineError, StatePick};
use crate::notifier::{NotifyKind, NotifyPayload};
use claw_adapters::runner::AgentRunner;
use claw_adapters::tracker::{IssueDetails, TrackerAdapter};
use claw_adapters::worktree::WorktreeAdapter;
use claw_core::clock::Clock;
use claw_core::dispatch::{
    ActiveDispatch, CompletedDispatch, CompletedStatus, DispatchStatus, SessionMapping,
    SessionPhase,
};
use claw_core::verdict::{parse_verdict, Verdict, VerdictOutcome};
use claw_core::{event_key, SessionKey};
use claw_storage::artifacts::build_summary_from_artifacts;
use claw_storage::state::TransitionUpdates;

impl<T, R, W, C> Engine<T, R, W, C>
where
    T: TrackerAdapter,
    R: AgentRunner,
    W: WorktreeAdapter,
    C: Clock,
{
    /// Start the audit after a worker run identified by `worker_key`.
    pub async fn trigger_audit(
        &self,
        dispatch: &ActiveDispatch,
        worker_key: &SessionKey,
    ) -> Result<(), EngineError> {
        let id = dispatch.issue_identifier.as_str();

        if !self
            .store
            .mark_event_processed(&event_key::worker_end(worker_key))?
        {
            tracing::info!(id, "worker end already handled");
            return Ok(());
        }

        let dispatch = match self.store.transition(
            id,
            DispatchStatus::Working,
            DispatchStatus::Auditing,
            TransitionUpdates::default(),
        ) {
            Ok(updated) => updated,
            Err(e) => {
                self.log_cas_rejection("trigger_audit", &e);
                return Ok(());
            }
        };

        let artifacts = self.artifacts(&dispatch);
        artifacts.update_manifest("auditing", dispatch.attempt, self.now_ms());

        let issue = self.tracker.get_issue_details(&dispatch.issue_id).await?;
        let prompts = self.prompts.for_worktree(&dispatch.worktree_path);
        let vars = self.prompt_vars(&dispatch, &issue, &[]);
        let prompt = prompts.render_audit(&vars);

        let audit_key = SessionKey::generate();
        self.store.register_session_mapping(
            &audit_key,
            SessionMapping {
                dispatch_id: id.to_string(),
                phase: SessionPhase::Audit,
                attempt: dispatch.attempt,
            },
        )?;
        self.store.record_audit_session(id, &audit_key)?;

        self.notifier
            .notify(
                NotifyKind::Auditing,
                &NotifyPayload {
                    identifier: issue.identifier.clone(),
                    title: issue.title.clone(),
                    status: "auditing".to_string(),
                    attempt: Some(dispatch.attempt),
                    ..NotifyPayload::default()
                },
            )
            .await;

        let request = self.run_request(&dispatch, &audit_key, prompt);
        let result = match self.runner.run(request).await {
            Ok(result) => result,
            Err(e) => {
                // `auditing → failed` is not a legal edge; leave the state
                // for a later pass and tell the user what happened.
                tracing::error!(id, error = %e, "audit runner failed");
                self.post_comment(
                    &issue.id,
                    &format!(
                        "The audit on {} could not run ({e}); it will be retried.",
                        issue.identifier
                    ),
                    self.config.default_agent_id.as_deref(),
                )
                .await;
                return Ok(());
            }
        };

        self.process_verdict(&dispatch, &result.output, &audit_key)
            .await
    }

    /// Land an audit result: parse the verdict and branch pass/fail.
    pub async fn process_verdict(
        &self,
        dispatch: &ActiveDispatch,
        audit_output: &str,
        audit_key: &SessionKey,
    ) -> Result<(), EngineError> {
        let id = dispatch.issue_identifier.as_str();

        if !self
            .store
            .mark_event_processed(&event_key::audit_end(audit_key))?
        {
            tracing::info!(id, "audit end already handled");
            return Ok(());
        }

        let artifacts = self.artifacts(dispatch);
        artifacts.append_log("audit", dispatch.attempt, "verdict received", self.now_ms());

        let issue = self.tracker.get_issue_details(&dispatch.issue_id).await?;
        let verdict = match parse_verdict(audit_output) {
            VerdictOutcome::Parsed(verdict) => verdict,
            VerdictOutcome::Unparseable => {
                tracing::warn!(id, "audit output had no parseable verdict");
                self.post_comment(
                    &issue.id,
                    &format!(
                        "## Audit Inconclusive\n\nThe audit on {} did not produce a \
                         readable verdict; treating it as a failed attempt.",
                        issue.identifier
                    ),
                    self.config.default_agent_id.as_deref(),
                )
                .await;
                Verdict::inconclusive("audit output was not parseable")
            }
        };

        if verdict.pass {
            self.handle_audit_pass(dispatch, &issue, &verdict).await
        } else {
            self.handle_audit_fail(dispatch, &issue, &verdict).await
        }
    }

    async fn handle_audit_pass(
        &self,
        dispatch: &ActiveDispatch,
        issue: &IssueDetails,
        verdict: &Verdict,
    ) -> Result<(), EngineError> {
        let id = dispatch.issue_identifier.as_str();
        let artifacts = self.artifacts(dispatch);
        artifacts.write_audit_verdict(dispatch.attempt, verdict);
        artifacts.update_manifest("done", dispatch.attempt + 1, self.now_ms());

        if let Err(e) = self.store.transition(
            id,
            DispatchStatus::Auditing,
            DispatchStatus::Done,
            TransitionUpdates::default(),
        ) {
            self.log_cas_rejection("audit_pass", &e);
            return Ok(());
        }

        if let Some(summary) = build_summary_from_artifacts(&dispatch.worktree_path) {
            self.write_memory(id, &summary);
        }

        // PR creation is best-effort and only attempted when the worker
        // actually committed something.
        let pr_url = match self.worktree.worktree_status(&dispatch.worktree_path).await {
            Ok(status) if status.last_commit.is_some() => {
                let title = format!("{}: {}", issue.identifier, issue.title);
                let body = format!(
                    "Automated change for {}.\n\nVerified:\n{}",
                    issue.identifier,
                    bullet_list(&verdict.criteria)
                );
                match self
                    .worktree
                    .create_pull_request(&dispatch.worktree_path, &title, &body)
                    .await
                {
                    Ok(url) => Some(url),
                    Err(e) => {
                        tracing::warn!(id, error = %e, "PR creation failed");
                        None
                    }
                }
            }
            Ok(_) => {
                tracing::info!(id, "no commits in worktree; skipping PR");
                None
            }
            Err(e) => {
                tracing::warn!(id, error = %e, "worktree status unavailable; skipping PR");
                None
            }
        };

        let record = CompletedDispatch {
            issue_identifier: id.to_string(),
            tier: dispatch.tier,
            status: CompletedStatus::Done,
            completed_at: self.now_ms(),
            pr_url: pr_url.clone(),
            project: dispatch.project.clone(),
            total_attempts: dispatch.attempt + 1,
        };
        self.store.complete_dispatch(id, record)?;

        match &pr_url {
            Some(_) => self.move_issue_to(issue, StatePick::Review).await,
            None => self.move_issue_to(issue, StatePick::Completed).await,
        }

        let mut comment = format!(
            "## Audit Passed\n\nWork on {} is done.\n\nVerified:\n{}",
            issue.identifier,
            bullet_list(&verdict.criteria)
        );
        if !verdict.test_results.is_empty() {
            comment.push_str(&format!("\nTests: {}\n", verdict.test_results));
        }
        if let Some(url) = &pr_url {
            comment.push_str(&format!("\nPull request: {url}\n"));
        }
        self.post_comment(&issue.id, &comment, self.config.default_agent_id.as_deref())
            .await;

        self.notifier
            .notify(
                NotifyKind::AuditPass,
                &NotifyPayload {
                    identifier: issue.identifier.clone(),
                    title: issue.title.clone(),
                    status: "done".to_string(),
                    attempt: Some(dispatch.attempt),
                    verdict: Some(verdict.clone()),
                    ..NotifyPayload::default()
                },
            )
            .await;

        if let Some(project_id) = dispatch.project.clone() {
            self.cascade_completed(&project_id, id).await;
        }

        self.end_run(&dispatch.issue_id);
        Ok(())
    }

    async fn handle_audit_fail(
        &self,
        dispatch: &ActiveDispatch,
        issue: &IssueDetails,
        verdict: &Verdict,
    ) -> Result<(), EngineError> {
        let id = dispatch.issue_identifier.as_str();
        let artifacts = self.artifacts(dispatch);
        artifacts.write_audit_verdict(dispatch.attempt, verdict);

        let next_attempt = dispatch.attempt + 1;
        let max_rework = self.config.max_rework_attempts;

        if next_attempt > max_rework {
            // Out of budget: escalate to a human.
            artifacts.update_manifest("stuck", next_attempt, self.now_ms());
            let reason = format!("audit_failed_{next_attempt}x");
            if let Err(e) = self.store.transition(
                id,
                DispatchStatus::Auditing,
                DispatchStatus::Stuck,
                TransitionUpdates::stuck(reason.clone()),
            ) {
                self.log_cas_rejection("audit_escalation", &e);
                return Ok(());
            }

            if let Some(summary) = build_summary_from_artifacts(&dispatch.worktree_path) {
                self.write_memory(id, &summary);
            }
            self.move_issue_to(issue, StatePick::Triage).await;

            self.post_comment(
                &issue.id,
                &format!(
                    "## Needs Your Help\n\nThe audit on {} failed {} time(s); the rework \
                     budget is spent.\n\nOutstanding gaps:\n{}\nOptions:\n\
                     - Address the gaps manually and close the issue\n\
                     - Comment with more context and ask for another attempt\n\
                     - Split the issue into smaller pieces",
                    issue.identifier,
                    next_attempt,
                    bullet_list(&verdict.gaps)
                ),
                self.config.default_agent_id.as_deref(),
            )
            .await;

            self.notifier
                .notify(
                    NotifyKind::Escalation,
                    &NotifyPayload {
                        identifier: issue.identifier.clone(),
                        title: issue.title.clone(),
                        status: "stuck".to_string(),
                        attempt: Some(dispatch.attempt),
                        verdict: Some(verdict.clone()),
                        reason: Some(reason),
                        ..NotifyPayload::default()
                    },
                )
                .await;

            if let Some(project_id) = dispatch.project.clone() {
                self.cascade_stuck(&project_id, id).await;
            }
            self.end_run(&dispatch.issue_id);
            return Ok(());
        }

        // Rework: flip the state and notify. Re-running the worker is the
        // orchestrator's call, made from the state change, not a recursive
        // call from here.
        if let Err(e) = self.store.transition(
            id,
            DispatchStatus::Auditing,
            DispatchStatus::Working,
            TransitionUpdates::attempt(next_attempt),
        ) {
            self.log_cas_rejection("audit_rework", &e);
            return Ok(());
        }

        let remaining = max_rework - next_attempt + 1;
        self.post_comment(
            &issue.id,
            &format!(
                "The audit on {} found gaps; sending it back for rework \
                 ({} attempt(s) left).\n\nGaps:\n{}",
                issue.identifier,
                remaining,
                bullet_list(&verdict.gaps)
            ),
            self.config.default_agent_id.as_deref(),
        )
        .await;

        self.notifier
            .notify(
                NotifyKind::AuditFail,
                &NotifyPayload {
                    identifier: issue.identifier.clone(),
                    title: issue.title.clone(),
                    status: "working".to_string(),
                    attempt: Some(dispatch.attempt),
                    verdict: Some(verdict.clone()),
                    ..NotifyPayload::default()
                },
            )
            .await;

        Ok(())
    }
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "- (none listed)\n".to_string();
    }
    items.iter().map(|i| format!("- {i}\n")).collect()
}
