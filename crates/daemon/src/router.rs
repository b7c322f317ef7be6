// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Webhook routing: classify the event, dedup it, hand it to the engine.
//!
//! Dedup layers run in order:
//! 1. active-run guard (before any async I/O; catches our own echoes),
//! 2. viewer-id guard for comments we posted,
//! 3. in-memory TTL dedup,
//! 4. persisted event keys (`mark_event_processed`).

use claw_adapters::classifier::ClassifierTransport;
use claw_adapters::runner::AgentRunner;
use claw_adapters::tracker::TrackerAdapter;
use claw_adapters::worktree::WorktreeAdapter;
use claw_core::clock::Clock;
use claw_core::event_key;
use claw_engine::classify::{Intent, IntentClassifier, IssueContext};
use claw_engine::pipeline::Engine;
use claw_engine::runtime::DispatchRequest;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Webhook router over an engine and a classifier.
pub struct Router<T, R, W, C, X>
where
    T: TrackerAdapter,
    R: AgentRunner,
    W: WorktreeAdapter,
    C: Clock,
    X: ClassifierTransport,
{
    engine: Arc<Engine<T, R, W, C>>,
    classifier: IntentClassifier<X>,
    viewer_id: OnceCell<String>,
}

impl<T, R, W, C, X> Router<T, R, W, C, X>
where
    T: TrackerAdapter,
    R: AgentRunner,
    W: WorktreeAdapter,
    C: Clock,
    X: ClassifierTransport,
{
    pub fn new(engine: Arc<Engine<T, R, W, C>>, classifier: IntentClassifier<X>) -> Self {
        Self { engine, classifier, viewer_id: OnceCell::new() }
    }

    pub fn engine(&self) -> &Arc<Engine<T, R, W, C>> {
        &self.engine
    }

    async fn viewer_id(&self) -> Option<&str> {
        self.viewer_id
            .get_or_try_init(|| self.engine.tracker().get_viewer_id())
            .await
            .map(String::as_str)
            .map_err(|e| tracing::warn!(error = %e, "viewer id unavailable"))
            .ok()
    }

    /// Handle one acknowledged webhook payload. Runs on a detached task;
    /// everything here is post-response and best-effort.
    pub async fn dispatch(&self, payload: Value) {
        let event_type = payload["type"].as_str().unwrap_or_default();
        let action = payload["action"].as_str().unwrap_or_default();

        match (event_type, action) {
            ("AppUserNotification", _) => {
                tracing::debug!("ignoring app user notification");
            }
            ("AgentSessionEvent", "created") | ("AgentSession", "create") => {
                self.handle_session_created(&payload).await;
            }
            ("AgentSessionEvent", "prompted") | ("AgentSession", "prompted") => {
                self.handle_session_prompted(&payload).await;
            }
            ("Comment", "create") => {
                self.handle_comment(&payload).await;
            }
            ("Issue", "update") => {
                self.handle_issue_update(&payload).await;
            }
            ("Issue", "create") => {
                self.handle_issue_create(&payload).await;
            }
            other => {
                tracing::debug!(event = ?other, "unrouted webhook event");
            }
        }
    }

    /// A session opened on an issue: start a dispatch for it.
    async fn handle_session_created(&self, payload: &Value) {
        let Some(issue_id) = data_str(payload, &["issue", "id"]) else {
            tracing::debug!("session event without issue id");
            return;
        };
        // Layer 1: our own tracker calls echo back as webhooks.
        if self.engine.owns_run(issue_id) {
            tracing::debug!(issue_id, "issue already in flight; skipping session event");
            return;
        }
        let session_id = data_str(payload, &["sessionId"])
            .or_else(|| data_str(payload, &["id"]))
            .unwrap_or(issue_id);
        if !self.fresh(&event_key::session(session_id)).await {
            return;
        }

        if let Err(e) = self
            .engine
            .start_and_drive(issue_id, DispatchRequest::default())
            .await
        {
            tracing::error!(issue_id, error = %e, "session dispatch failed");
        }
    }

    /// A user replied inside an existing session: treat like a comment.
    async fn handle_session_prompted(&self, payload: &Value) {
        let Some(issue_id) = data_str(payload, &["issue", "id"]) else {
            return;
        };
        if self.engine.owns_run(issue_id) {
            return;
        }
        let session_id = data_str(payload, &["sessionId"])
            .or_else(|| data_str(payload, &["id"]))
            .unwrap_or(issue_id);
        let key = format!("{}:prompted", event_key::session(session_id));
        if !self.fresh(&key).await {
            return;
        }
        let body = data_str(payload, &["body"])
            .or_else(|| data_str(payload, &["prompt"]))
            .unwrap_or_default()
            .to_string();
        self.route_comment_body(issue_id, &body).await;
    }

    async fn handle_comment(&self, payload: &Value) {
        let Some(issue_id) = data_str(payload, &["issue", "id"]) else {
            tracing::debug!("comment event without issue id");
            return;
        };
        // Layer 1 must run before any await on tracker or classifier.
        if self.engine.owns_run(issue_id) {
            tracing::debug!(issue_id, "comment on issue we are working; skipping");
            return;
        }

        // Layer 2: our own comments echo back with our viewer id.
        let author = data_str(payload, &["user", "id"]);
        if let (Some(author), Some(viewer)) = (author, self.viewer_id().await) {
            if author == viewer {
                tracing::debug!(issue_id, "own comment echoed back; skipping");
                return;
            }
        }

        let Some(comment_id) = data_str(payload, &["id"]) else {
            return;
        };
        if !self.fresh(&event_key::comment(comment_id)).await {
            return;
        }

        let body = data_str(payload, &["body"]).unwrap_or_default().to_string();
        self.route_comment_body(issue_id, &body).await;
    }

    /// The comment decision tree: mention fast path, then classifier.
    async fn route_comment_body(&self, issue_id: &str, body: &str) {
        if let Some(profile) = self.engine.profiles().mentioned_in(body) {
            tracing::info!(issue_id, agent = %profile.id, "mention fast path");
            let request = DispatchRequest {
                agent_id: Some(profile.id.clone()),
                ..DispatchRequest::default()
            };
            if let Err(e) = self.engine.start_and_drive(issue_id, request).await {
                tracing::error!(issue_id, error = %e, "mention dispatch failed");
            }
            return;
        }

        let ctx = match self.engine.tracker().get_issue_details(issue_id).await {
            Ok(issue) => IssueContext {
                identifier: issue.identifier,
                title: issue.title,
                state_name: issue.state.name,
            },
            Err(e) => {
                tracing::warn!(issue_id, error = %e, "issue context unavailable for classify");
                IssueContext::default()
            }
        };
        let classification = self.classifier.classify(body, &ctx).await;
        tracing::info!(
            issue_id,
            intent = %classification.intent,
            from_fallback = classification.from_fallback,
            "comment classified"
        );

        match classification.intent {
            Intent::General => {
                tracing::debug!(issue_id, "general chatter; no action");
            }
            Intent::AskAgent | Intent::RequestWork | Intent::Question => {
                let request = DispatchRequest {
                    agent_id: classification.agent_id.clone(),
                    ..DispatchRequest::default()
                };
                if let Err(e) = self.engine.start_and_drive(issue_id, request).await {
                    tracing::error!(issue_id, error = %e, "comment dispatch failed");
                }
            }
            Intent::CloseIssue => {
                if let Err(e) = self.engine.close_issue(issue_id, "requested in a comment").await {
                    tracing::warn!(issue_id, error = %e, "close request failed");
                }
            }
            Intent::PlanStart
            | Intent::PlanContinue
            | Intent::PlanFinalize
            | Intent::PlanAbandon => {
                // The planning subsystem owns these flows; acknowledge so
                // the user is not left hanging.
                self.engine
                    .post_comment_public(
                        issue_id,
                        "Planning request noted; the planning assistant will pick it up.",
                    )
                    .await;
            }
        }
    }

    /// Assignment or delegation to us is a dispatch trigger.
    async fn handle_issue_update(&self, payload: &Value) {
        let Some(issue_id) = data_str(payload, &["id"]) else {
            return;
        };
        if self.engine.owns_run(issue_id) {
            return;
        }
        let Some(viewer) = self.viewer_id().await else {
            return;
        };
        let assignee = data_str(payload, &["assignee", "id"]);
        let delegate = data_str(payload, &["delegate", "id"]);
        let assigned_to_us = assignee == Some(viewer) || delegate == Some(viewer);
        // Only react when the assignment actually changed in this update.
        let assignment_changed = payload
            .get("updatedFrom")
            .map(|from| from.get("assigneeId").is_some() || from.get("delegateId").is_some())
            .unwrap_or(false);
        if !assigned_to_us || !assignment_changed {
            return;
        }

        let key = event_key::trigger("assigned", issue_id, viewer);
        if !self.fresh(&key).await {
            return;
        }
        if let Err(e) = self
            .engine
            .start_and_drive(issue_id, DispatchRequest::default())
            .await
        {
            tracing::error!(issue_id, error = %e, "assignment dispatch failed");
        }
    }

    async fn handle_issue_create(&self, payload: &Value) {
        let Some(issue_id) = data_str(payload, &["id"]) else {
            return;
        };
        if !self.fresh(&event_key::issue_create(issue_id)).await {
            return;
        }
        self.engine.auto_triage(issue_id).await;
    }

    /// Layers 3 and 4: TTL map then the persisted key set.
    async fn fresh(&self, key: &str) -> bool {
        if self.engine.seen_recently(key) {
            tracing::debug!(key, "duplicate within TTL window");
            return false;
        }
        match self.engine.store().mark_event_processed(key) {
            Ok(true) => true,
            Ok(false) => {
                tracing::debug!(key, "duplicate event key");
                false
            }
            Err(e) => {
                // Failing open would double-run agents on storage trouble;
                // failing closed only delays handling until a retry.
                tracing::error!(key, error = %e, "event dedup unavailable; dropping event");
                false
            }
        }
    }
}

/// Pull a string out of the payload's `data` object.
fn data_str<'a>(payload: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut current = payload.get("data")?;
    for key in path {
        current = current.get(key)?;
    }
    current.as_str()
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
