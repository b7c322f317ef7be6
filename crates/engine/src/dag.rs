// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! DAG cascade for project-scoped dispatches.
//!
//! One dispatch reaching a terminal state re-evaluates the project plan:
//! issues whose dependencies are now all done get real dispatches (within
//! `max_concurrent`), a fully-done plan closes, and a stuck issue that
//! blocks all remaining work sticks the whole project. Both entry points
//! are idempotent and tolerate projects or issues that no longer exist.
//!
//! Newly unblocked issues are not started inline: they are queued as
//! [`DispatchCommand`]s for the runtime loop, so a finishing dispatch is
//! never held hostage by the pipelines it unblocks.

use crate::notifier::{NotifyKind, NotifyPayload};
use crate::pipeline::Engine;
use crate::runtime::{DispatchCommand, DispatchRequest};
use claw_adapters::runner::AgentRunner;
use claw_adapters::tracker::TrackerAdapter;
use claw_adapters::worktree::WorktreeAdapter;
use claw_core::clock::Clock;
use claw_core::project::{IssueDispatchStatus, ProjectDispatch, ProjectStatus};

/// What a completed-issue cascade decided.
struct CascadeOutcome {
    project_name: String,
    /// (identifier, tracker issue id) pairs to dispatch now.
    to_dispatch: Vec<(String, Option<String>)>,
    done: usize,
    total: usize,
    project_done: bool,
}

impl<T, R, W, C> Engine<T, R, W, C>
where
    T: TrackerAdapter,
    R: AgentRunner,
    W: WorktreeAdapter,
    C: Clock,
{
    /// Register a plan and dispatch its initial ready set.
    ///
    /// Called by the planning subsystem when a plan is finalized.
    pub async fn start_project_dispatch(&self, mut project: ProjectDispatch) {
        if let Err(e) = project.validate_acyclic() {
            tracing::error!(project = %project.project_id, error = %e, "rejecting cyclic plan");
            return;
        }
        project.status = ProjectStatus::Dispatching;
        let project_id = project.project_id.clone();
        if let Err(e) = self.projects.upsert(project) {
            tracing::error!(project = %project_id, error = %e, "could not persist plan");
            return;
        }
        // The initial ready set is "everything with no dependencies".
        self.cascade_completed(&project_id, "").await;
    }

    /// Re-evaluate a plan after `identifier` finished.
    pub async fn cascade_completed(&self, project_id: &str, identifier: &str) {
        let outcome = self.projects.update(project_id, |project| {
            if let Some(issue) = project.issues.get_mut(identifier) {
                issue.dispatch_status = IssueDispatchStatus::Done;
            }

            let capacity = project
                .max_concurrent
                .saturating_sub(project.dispatched_count() as u32) as usize;
            let to_dispatch: Vec<(String, Option<String>)> = project
                .ready_issues()
                .into_iter()
                .take(capacity)
                .map(|id| {
                    let issue_id = project.issues.get(&id).and_then(|i| i.issue_id.clone());
                    (id, issue_id)
                })
                .collect();
            for (id, _) in &to_dispatch {
                if let Some(issue) = project.issues.get_mut(id) {
                    issue.dispatch_status = IssueDispatchStatus::Dispatched;
                }
            }

            if project.all_done() {
                project.status = ProjectStatus::Done;
            }

            CascadeOutcome {
                project_name: project.project_name.clone(),
                to_dispatch,
                done: project.done_count(),
                total: project.issues.len(),
                project_done: project.all_done(),
            }
        });

        let outcome = match outcome {
            Ok(Some(outcome)) => outcome,
            Ok(None) => {
                tracing::info!(project = project_id, "cascade for unknown project; ignoring");
                return;
            }
            Err(e) => {
                tracing::error!(project = project_id, error = %e, "cascade load failed");
                return;
            }
        };

        for (identifier, issue_id) in &outcome.to_dispatch {
            let Some(issue_id) = issue_id else {
                tracing::warn!(
                    project = project_id,
                    identifier,
                    "plan issue has no tracker id; cannot dispatch"
                );
                continue;
            };
            self.queue_dispatch(DispatchCommand {
                issue_id: issue_id.clone(),
                request: DispatchRequest {
                    project: Some(project_id.to_string()),
                    ..DispatchRequest::default()
                },
            });
        }

        self.notifier
            .notify(
                NotifyKind::ProjectProgress,
                &NotifyPayload {
                    identifier: project_id.to_string(),
                    title: outcome.project_name.clone(),
                    status: format!(
                        "{}/{} done{}",
                        outcome.done,
                        outcome.total,
                        if outcome.project_done { ", project complete" } else { "" }
                    ),
                    ..NotifyPayload::default()
                },
            )
            .await;
    }

    /// Mark `identifier` stuck and stick the project if nothing can move.
    pub async fn cascade_stuck(&self, project_id: &str, identifier: &str) {
        let result = self.projects.update(project_id, |project| {
            if let Some(issue) = project.issues.get_mut(identifier) {
                issue.dispatch_status = IssueDispatchStatus::Stuck;
            }
            if project.is_blocked() {
                project.status = ProjectStatus::Stuck;
            }
            project.status
        });

        match result {
            Ok(Some(ProjectStatus::Stuck)) => {
                tracing::warn!(project = project_id, identifier, "project is stuck");
            }
            Ok(Some(_)) => {
                tracing::info!(project = project_id, identifier, "issue stuck, project can continue");
            }
            Ok(None) => {
                tracing::info!(project = project_id, "stuck cascade for unknown project; ignoring");
            }
            Err(e) => {
                tracing::error!(project = project_id, error = %e, "stuck cascade load failed");
            }
        }
    }
}

#[cfg(test)]
#[path = "dag_tests.rs"]
mod tests;
