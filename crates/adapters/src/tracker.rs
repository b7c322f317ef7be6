// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Issue tracker contract.
//!
//! The tracker's HTTP/GraphQL surface lives behind this trait; the core
//! only ever sees the narrow slice below. The fake records every call so
//! tests can assert on the conversation with the tracker.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("tracker request failed: {0}")]
    Request(String),

    #[error("issue {0} not found")]
    IssueNotFound(String),

    /// Identity-mode posting rejected; callers fall back to plain comments.
    #[error("identity posting unavailable: {0}")]
    IdentityUnavailable(String),
}

/// Workflow state category, mirroring the tracker's fixed taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStateType {
    Backlog,
    Unstarted,
    Started,
    Completed,
    Canceled,
    Triage,
}

claw_core::simple_display! {
    WorkflowStateType {
        Backlog => "backlog",
        Unstarted => "unstarted",
        Started => "started",
        Completed => "completed",
        Canceled => "canceled",
        Triage => "triage",
    }
}

/// One workflow state of a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub id: String,
    pub name: String,
    pub state_type: WorkflowStateType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct IssueTeam {
    pub id: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_estimation_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct IssueStateRef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub state_type: Option<WorkflowStateType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueProjectRef {
    pub id: String,
    pub name: String,
}

/// Everything the pipeline needs to know about an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct IssueDetails {
    pub id: String,
    pub identifier: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub state: IssueStateRef,
    #[serde(default)]
    pub team: IssueTeam,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<IssueProjectRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Field updates for `update_issue`. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<String>,
}

/// Identity used when posting a comment as a branded agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    pub agent_id: String,
    pub label: String,
    pub avatar_url: Option<String>,
}

/// Activity emitted into an agent session on the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityContent {
    Thought { body: String },
    Action { action: String, parameter: Option<String> },
    /// Session-closing variant.
    Response { body: String },
    Error { body: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookInfo {
    pub id: String,
    pub url: String,
    pub enabled: bool,
}

/// The tracker API slice the core consumes.
#[async_trait]
pub trait TrackerAdapter: Send + Sync + 'static {
    async fn get_issue_details(&self, issue_id: &str) -> Result<IssueDetails, TrackerError>;

    /// Opaque id identifying "us" on the tracker.
    async fn get_viewer_id(&self) -> Result<String, TrackerError>;

    async fn get_team_states(&self, team_id: &str) -> Result<Vec<WorkflowState>, TrackerError>;

    async fn get_team_labels(&self, team_id: &str) -> Result<Vec<Label>, TrackerError>;

    /// Post a comment; returns the created comment id.
    ///
    /// When `identity` is set, the tracker is asked to brand the comment
    /// as that agent. Implementations surface identity failures as
    /// [`TrackerError::IdentityUnavailable`] so callers can retry plain.
    async fn create_comment(
        &self,
        issue_id: &str,
        body: &str,
        identity: Option<&AgentIdentity>,
    ) -> Result<String, TrackerError>;

    async fn update_issue(&self, issue_id: &str, update: IssueUpdate) -> Result<(), TrackerError>;

    /// Best-effort: the tracker may not support agent sessions.
    async fn create_session_on_issue(&self, issue_id: &str) -> Result<Option<String>, TrackerError>;

    async fn emit_activity(
        &self,
        session_id: &str,
        content: ActivityContent,
    ) -> Result<(), TrackerError>;

    async fn create_reaction(&self, comment_id: &str, name: &str) -> Result<(), TrackerError>;

    async fn list_webhooks(&self) -> Result<Vec<WebhookInfo>, TrackerError>;

    async fn create_webhook(&self, url: &str) -> Result<WebhookInfo, TrackerError>;

    async fn update_webhook(&self, id: &str, url: &str) -> Result<(), TrackerError>;

    async fn delete_webhook(&self, id: &str) -> Result<(), TrackerError>;
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// One comment recorded by the fake.
    #[derive(Debug, Clone)]
    pub struct PostedComment {
        pub issue_id: String,
        pub body: String,
        pub as_identity: Option<String>,
    }

    #[derive(Default)]
    struct FakeTrackerState {
        issues: HashMap<String, IssueDetails>,
        team_states: HashMap<String, Vec<WorkflowState>>,
        team_labels: HashMap<String, Vec<Label>>,
        comments: Vec<PostedComment>,
        updates: Vec<(String, IssueUpdate)>,
        reactions: Vec<(String, String)>,
        activities: Vec<(String, ActivityContent)>,
        webhooks: Vec<WebhookInfo>,
        viewer_id: String,
        identity_posting_fails: bool,
        next_comment_id: u64,
    }

    /// In-memory tracker with canned data and full call recording.
    #[derive(Clone)]
    pub struct FakeTrackerAdapter {
        state: Arc<Mutex<FakeTrackerState>>,
    }

    impl Default for FakeTrackerAdapter {
        fn default() -> Self {
            Self::new()
        }
    }

    impl FakeTrackerAdapter {
        pub fn new() -> Self {
            let state = FakeTrackerState {
                viewer_id: "viewer-claw".to_string(),
                next_comment_id: 1,
                ..FakeTrackerState::default()
            };
            Self { state: Arc::new(Mutex::new(state)) }
        }

        /// Seed an issue; the default team gets a standard state set.
        pub fn with_issue(self, issue: IssueDetails) -> Self {
            {
                let mut state = self.state.lock();
                let team_id = issue.team.id.clone();
                state
                    .team_states
                    .entry(team_id)
                    .or_insert_with(standard_states);
                state.issues.insert(issue.id.clone(), issue);
            }
            self
        }

        pub fn with_identity_posting_failing(self) -> Self {
            self.state.lock().identity_posting_fails = true;
            self
        }

        pub fn comments(&self) -> Vec<PostedComment> {
            self.state.lock().comments.clone()
        }

        pub fn issue_updates(&self) -> Vec<(String, IssueUpdate)> {
            self.state.lock().updates.clone()
        }

        pub fn activities(&self) -> Vec<(String, ActivityContent)> {
            self.state.lock().activities.clone()
        }

        pub fn webhooks(&self) -> Vec<WebhookInfo> {
            self.state.lock().webhooks.clone()
        }

        /// The state id an `update_issue` moved the issue to, if any.
        pub fn last_state_id(&self, issue_id: &str) -> Option<String> {
            self.state
                .lock()
                .updates
                .iter()
                .rev()
                .find(|(id, u)| id == issue_id && u.state_id.is_some())
                .and_then(|(_, u)| u.state_id.clone())
        }
    }

    fn standard_states() -> Vec<WorkflowState> {
        [
            ("st-backlog", "Backlog", WorkflowStateType::Backlog),
            ("st-todo", "Todo", WorkflowStateType::Unstarted),
            ("st-progress", "In Progress", WorkflowStateType::Started),
            ("st-review", "In Review", WorkflowStateType::Started),
            ("st-done", "Done", WorkflowStateType::Completed),
            ("st-triage", "Triage", WorkflowStateType::Triage),
        ]
        .into_iter()
        .map(|(id, name, state_type)| WorkflowState {
            id: id.to_string(),
            name: name.to_string(),
            state_type,
        })
        .collect()
    }

    #[async_trait]
    impl TrackerAdapter for FakeTrackerAdapter {
        async fn get_issue_details(&self, issue_id: &str) -> Result<IssueDetails, TrackerError> {
            self.state
                .lock()
                .issues
                .get(issue_id)
                .cloned()
                .ok_or_else(|| TrackerError::IssueNotFound(issue_id.to_string()))
        }

        async fn get_viewer_id(&self) -> Result<String, TrackerError> {
            Ok(self.state.lock().viewer_id.clone())
        }

        async fn get_team_states(
            &self,
            team_id: &str,
        ) -> Result<Vec<WorkflowState>, TrackerError> {
            Ok(self
                .state
                .lock()
                .team_states
                .get(team_id)
                .cloned()
                .unwrap_or_else(standard_states))
        }

        async fn get_team_labels(&self, team_id: &str) -> Result<Vec<Label>, TrackerError> {
            Ok(self
                .state
                .lock()
                .team_labels
                .get(team_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn create_comment(
            &self,
            issue_id: &str,
            body: &str,
            identity: Option<&AgentIdentity>,
        ) -> Result<String, TrackerError> {
            let mut state = self.state.lock();
            if identity.is_some() && state.identity_posting_fails {
                return Err(TrackerError::IdentityUnavailable(
                    "identity posting disabled".to_string(),
                ));
            }
            let id = format!("comment-{}", state.next_comment_id);
            state.next_comment_id += 1;
            state.comments.push(PostedComment {
                issue_id: issue_id.to_string(),
                body: body.to_string(),
                as_identity: identity.map(|i| i.agent_id.clone()),
            });
            Ok(id)
        }

        async fn update_issue(
            &self,
            issue_id: &str,
            update: IssueUpdate,
        ) -> Result<(), TrackerError> {
            self.state
                .lock()
                .updates
                .push((issue_id.to_string(), update));
            Ok(())
        }

        async fn create_session_on_issue(
            &self,
            issue_id: &str,
        ) -> Result<Option<String>, TrackerError> {
            Ok(Some(format!("session-for-{issue_id}")))
        }

        async fn emit_activity(
            &self,
            session_id: &str,
            content: ActivityContent,
        ) -> Result<(), TrackerError> {
            self.state
                .lock()
                .activities
                .push((session_id.to_string(), content));
            Ok(())
        }

        async fn create_reaction(&self, comment_id: &str, name: &str) -> Result<(), TrackerError> {
            self.state
                .lock()
                .reactions
                .push((comment_id.to_string(), name.to_string()));
            Ok(())
        }

        async fn list_webhooks(&self) -> Result<Vec<WebhookInfo>, TrackerError> {
            Ok(self.state.lock().webhooks.clone())
        }

        async fn create_webhook(&self, url: &str) -> Result<WebhookInfo, TrackerError> {
            let mut state = self.state.lock();
            let info = WebhookInfo {
                id: format!("webhook-{}", state.webhooks.len() + 1),
                url: url.to_string(),
                enabled: true,
            };
            state.webhooks.push(info.clone());
            Ok(info)
        }

        async fn update_webhook(&self, id: &str, url: &str) -> Result<(), TrackerError> {
            let mut state = self.state.lock();
            for hook in &mut state.webhooks {
                if hook.id == id {
                    hook.url = url.to_string();
                }
            }
            Ok(())
        }

        async fn delete_webhook(&self, id: &str) -> Result<(), TrackerError> {
            self.state.lock().webhooks.retain(|h| h.id != id);
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeTrackerAdapter, PostedComment};

#[cfg(test)]
#[path = "tracker_tests.rs"]
mod tests;
