// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! GraphQL-over-HTTP tracker client.
//!
//! Only the slice of the tracker API the core consumes is implemented;
//! optional surfaces (agent sessions, activities) degrade to no-ops when
//! the tracker rejects them, matching their best-effort contracts.

use crate::tracker::{
    ActivityContent, AgentIdentity, IssueDetails, IssueProjectRef, IssueStateRef, IssueTeam,
    IssueUpdate, Label, TrackerAdapter, TrackerError, WebhookInfo, WorkflowState,
    WorkflowStateType,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Tracker client speaking GraphQL over HTTPS.
#[derive(Clone)]
pub struct HttpTrackerAdapter {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl HttpTrackerAdapter {
    pub const TOKEN_ENV: &'static str = "CLAW_TRACKER_TOKEN";
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.linear.app/graphql";

    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, token: String) -> Self {
        Self { client, endpoint: endpoint.into(), token }
    }

    /// Construct from the environment; `None` when no token is set.
    pub fn from_env(client: reqwest::Client) -> Option<Self> {
        let token = std::env::var(Self::TOKEN_ENV).ok()?;
        Some(Self::new(client, Self::DEFAULT_ENDPOINT, token))
    }

    async fn graphql(&self, query: &str, variables: Value) -> Result<Value, TrackerError> {
        let response = self
            .client
            .post(&self.endpoint)
            .timeout(REQUEST_TIMEOUT)
            .header("Authorization", &self.token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|e| TrackerError::Request(e.to_string()))?;
        let body: Value = response
            .error_for_status()
            .map_err(|e| TrackerError::Request(e.to_string()))?
            .json()
            .await
            .map_err(|e| TrackerError::Request(e.to_string()))?;
        let has_errors = body
            .get("errors")
            .and_then(Value::as_array)
            .map(|a| !a.is_empty())
            .unwrap_or(false);
        if has_errors {
            return Err(TrackerError::Request(body["errors"].to_string()));
        }
        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }
}

fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    current.as_str()
}

fn state_type_from(name: &str) -> Option<WorkflowStateType> {
    match name {
        "backlog" => Some(WorkflowStateType::Backlog),
        "unstarted" => Some(WorkflowStateType::Unstarted),
        "started" => Some(WorkflowStateType::Started),
        "completed" => Some(WorkflowStateType::Completed),
        "canceled" => Some(WorkflowStateType::Canceled),
        "triage" => Some(WorkflowStateType::Triage),
        _ => None,
    }
}

#[async_trait]
impl TrackerAdapter for HttpTrackerAdapter {
    async fn get_issue_details(&self, issue_id: &str) -> Result<IssueDetails, TrackerError> {
        let data = self
            .graphql(
                "query($id: String!) { issue(id: $id) { id identifier title description url \
                 state { name type } team { id key } project { id name } assignee { id } \
                 labels { nodes { id name } } } }",
                json!({ "id": issue_id }),
            )
            .await?;
        let issue = data
            .get("issue")
            .filter(|i| !i.is_null())
            .ok_or_else(|| TrackerError::IssueNotFound(issue_id.to_string()))?;

        Ok(IssueDetails {
            id: str_at(issue, &["id"]).unwrap_or(issue_id).to_string(),
            identifier: str_at(issue, &["identifier"]).unwrap_or_default().to_string(),
            title: str_at(issue, &["title"]).unwrap_or_default().to_string(),
            description: str_at(issue, &["description"]).unwrap_or_default().to_string(),
            state: IssueStateRef {
                name: str_at(issue, &["state", "name"]).unwrap_or_default().to_string(),
                state_type: str_at(issue, &["state", "type"]).and_then(state_type_from),
            },
            team: IssueTeam {
                id: str_at(issue, &["team", "id"]).unwrap_or_default().to_string(),
                key: str_at(issue, &["team", "key"]).unwrap_or_default().to_string(),
                issue_estimation_type: None,
            },
            labels: issue
                .pointer("/labels/nodes")
                .and_then(Value::as_array)
                .map(|nodes| {
                    nodes
                        .iter()
                        .filter_map(|n| {
                            Some(Label {
                                id: str_at(n, &["id"])?.to_string(),
                                name: str_at(n, &["name"])?.to_string(),
                            })
                        })
                        .collect()
                })
                .unwrap_or_default(),
            project: issue.get("project").filter(|p| !p.is_null()).and_then(|p| {
                Some(IssueProjectRef {
                    id: str_at(p, &["id"])?.to_string(),
                    name: str_at(p, &["name"])?.to_string(),
                })
            }),
            assignee_id: str_at(issue, &["assignee", "id"]).map(str::to_string),
            url: str_at(issue, &["url"]).map(str::to_string),
        })
    }

    async fn get_viewer_id(&self) -> Result<String, TrackerError> {
        let data = self.graphql("query { viewer { id } }", json!({})).await?;
        str_at(&data, &["viewer", "id"])
            .map(str::to_string)
            .ok_or_else(|| TrackerError::Request("viewer id missing".to_string()))
    }

    async fn get_team_states(&self, team_id: &str) -> Result<Vec<WorkflowState>, TrackerError> {
        let data = self
            .graphql(
                "query($id: String!) { team(id: $id) { states { nodes { id name type } } } }",
                json!({ "id": team_id }),
            )
            .await?;
        Ok(data
            .pointer("/team/states/nodes")
            .and_then(Value::as_array)
            .map(|nodes| {
                nodes
                    .iter()
                    .filter_map(|n| {
                        Some(WorkflowState {
                            id: str_at(n, &["id"])?.to_string(),
                            name: str_at(n, &["name"])?.to_string(),
                            state_type: str_at(n, &["type"]).and_then(state_type_from)?,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_team_labels(&self, team_id: &str) -> Result<Vec<Label>, TrackerError> {
        let data = self
            .graphql(
                "query($id: String!) { team(id: $id) { labels { nodes { id name } } } }",
                json!({ "id": team_id }),
            )
            .await?;
        Ok(data
            .pointer("/team/labels/nodes")
            .and_then(Value::as_array)
            .map(|nodes| {
                nodes
                    .iter()
                    .filter_map(|n| {
                        Some(Label {
                            id: str_at(n, &["id"])?.to_string(),
                            name: str_at(n, &["name"])?.to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_comment(
        &self,
        issue_id: &str,
        body: &str,
        identity: Option<&AgentIdentity>,
    ) -> Result<String, TrackerError> {
        // Identity posting uses a separate input shape; trackers without
        // the capability answer with errors we map to IdentityUnavailable.
        let variables = match identity {
            Some(identity) => json!({
                "input": {
                    "issueId": issue_id,
                    "body": body,
                    "createAsUser": identity.label,
                    "displayIconUrl": identity.avatar_url,
                }
            }),
            None => json!({ "input": { "issueId": issue_id, "body": body } }),
        };
        let result = self
            .graphql(
                "mutation($input: CommentCreateInput!) { commentCreate(input: $input) \
                 { comment { id } } }",
                variables,
            )
            .await;
        match result {
            Ok(data) => str_at(&data, &["commentCreate", "comment", "id"])
                .map(str::to_string)
                .ok_or_else(|| TrackerError::Request("comment id missing".to_string())),
            Err(TrackerError::Request(message)) if identity.is_some() => {
                Err(TrackerError::IdentityUnavailable(message))
            }
            Err(e) => Err(e),
        }
    }

    async fn update_issue(&self, issue_id: &str, update: IssueUpdate) -> Result<(), TrackerError> {
        let mut input = serde_json::Map::new();
        if let Some(state_id) = update.state_id {
            input.insert("stateId".to_string(), json!(state_id));
        }
        if let Some(estimate) = update.estimate {
            input.insert("estimate".to_string(), json!(estimate));
        }
        if let Some(label_ids) = update.label_ids {
            input.insert("labelIds".to_string(), json!(label_ids));
        }
        if let Some(priority) = update.priority {
            input.insert("priority".to_string(), json!(priority));
        }
        if let Some(assignee_id) = update.assignee_id {
            input.insert("assigneeId".to_string(), json!(assignee_id));
        }
        self.graphql(
            "mutation($id: String!, $input: IssueUpdateInput!) \
             { issueUpdate(id: $id, input: $input) { success } }",
            json!({ "id": issue_id, "input": Value::Object(input) }),
        )
        .await
        .map(|_| ())
    }

    async fn create_session_on_issue(
        &self,
        issue_id: &str,
    ) -> Result<Option<String>, TrackerError> {
        // Optional tracker surface; absence is not an error.
        tracing::debug!(issue_id, "agent sessions not wired for this tracker");
        Ok(None)
    }

    async fn emit_activity(
        &self,
        session_id: &str,
        _content: ActivityContent,
    ) -> Result<(), TrackerError> {
        tracing::debug!(session_id, "activity emission skipped (no session support)");
        Ok(())
    }

    async fn create_reaction(&self, comment_id: &str, name: &str) -> Result<(), TrackerError> {
        self.graphql(
            "mutation($input: ReactionCreateInput!) { reactionCreate(input: $input) { success } }",
            json!({ "input": { "commentId": comment_id, "emoji": name } }),
        )
        .await
        .map(|_| ())
    }

    async fn list_webhooks(&self) -> Result<Vec<WebhookInfo>, TrackerError> {
        let data = self
            .graphql("query { webhooks { nodes { id url enabled } } }", json!({}))
            .await?;
        Ok(data
            .pointer("/webhooks/nodes")
            .and_then(Value::as_array)
            .map(|nodes| {
                nodes
                    .iter()
                    .filter_map(|n| {
                        Some(WebhookInfo {
                            id: str_at(n, &["id"])?.to_string(),
                            url: str_at(n, &["url"])?.to_string(),
                            enabled: n.get("enabled").and_then(Value::as_bool).unwrap_or(true),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_webhook(&self, url: &str) -> Result<WebhookInfo, TrackerError> {
        let data = self
            .graphql(
                "mutation($input: WebhookCreateInput!) { webhookCreate(input: $input) \
                 { webhook { id url enabled } } }",
                json!({ "input": { "url": url, "allPublicTeams": true } }),
            )
            .await?;
        let hook = data
            .pointer("/webhookCreate/webhook")
            .ok_or_else(|| TrackerError::Request("webhook missing from response".to_string()))?;
        Ok(WebhookInfo {
            id: str_at(hook, &["id"]).unwrap_or_default().to_string(),
            url: str_at(hook, &["url"]).unwrap_or(url).to_string(),
            enabled: true,
        })
    }

    async fn update_webhook(&self, id: &str, url: &str) -> Result<(), TrackerError> {
        self.graphql(
            "mutation($id: String!, $input: WebhookUpdateInput!) \
             { webhookUpdate(id: $id, input: $input) { success } }",
            json!({ "id": id, "input": { "url": url } }),
        )
        .await
        .map(|_| ())
    }

    async fn delete_webhook(&self, id: &str) -> Result<(), TrackerError> {
        self.graphql(
            "mutation($id: String!) { webhookDelete(id: $id) { success } }",
            json!({ "id": id }),
        )
        .await
        .map(|_| ())
    }
}
