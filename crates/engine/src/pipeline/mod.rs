// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The dispatch engine: worker → audit → verdict over one issue.
//!
//! Entry points are synchronous in the pipeline sense (`spawn_worker`
//! runs the worker to completion, `trigger_audit` runs the audit,
//! `process_verdict` lands the outcome) and each is idempotent through
//! the persisted event keys and CAS transitions. A CAS rejection means a
//! concurrent handler got there first; the loser logs at info and stands
//! down.

mod audit;
mod worker;

use crate::notifier::Notifier;
use crate::prompts::PromptLayers;
use claw_adapters::runner::{AgentRunner, RunnerError};
use claw_adapters::tracker::{
    AgentIdentity, IssueDetails, IssueUpdate, TrackerAdapter, TrackerError, WorkflowState,
    WorkflowStateType,
};
use claw_adapters::worktree::{WorktreeAdapter, WorktreeError};
use claw_core::clock::Clock;
use claw_core::config::PluginConfig;
use claw_core::dispatch::ActiveDispatch;
use claw_core::profile::AgentProfiles;
use claw_core::sanitize::{sanitize_prompt_input, MAX_PROMPT_INPUT_CHARS};
use claw_core::{event_key, SessionKey};
use claw_storage::artifacts::ArtifactWriter;
use claw_storage::projects::ProjectStore;
use claw_storage::state::{StateError, StateStore, TransitionError};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error(transparent)]
    Worktree(#[from] WorktreeError),
}

/// Options for a worker run.
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    /// Gap list from the failed audit, present on rework runs.
    pub gaps: Vec<String>,
}

/// Constructor dependencies for [`Engine`].
pub struct EngineDeps<T, R, W, C> {
    pub store: StateStore,
    pub projects: ProjectStore,
    pub tracker: Arc<T>,
    pub runner: Arc<R>,
    pub worktree: Arc<W>,
    pub notifier: Notifier,
    pub prompts: PromptLayers,
    pub config: PluginConfig,
    pub profiles: AgentProfiles,
    pub clock: C,
    /// Directory receiving per-issue summary notes on terminal states.
    pub memory_dir: PathBuf,
}

/// The orchestrator core: pipeline, DAG cascade, and the in-memory guards.
pub struct Engine<T, R, W, C>
where
    T: TrackerAdapter,
    R: AgentRunner,
    W: WorktreeAdapter,
    C: Clock,
{
    pub(crate) store: StateStore,
    pub(crate) projects: ProjectStore,
    pub(crate) tracker: Arc<T>,
    pub(crate) runner: Arc<R>,
    pub(crate) worktree: Arc<W>,
    pub(crate) notifier: Notifier,
    pub(crate) prompts: PromptLayers,
    pub(crate) config: PluginConfig,
    pub(crate) profiles: AgentProfiles,
    pub(crate) clock: C,
    pub(crate) memory_dir: PathBuf,
    /// Issue ids currently owned by an in-flight handler.
    pub(crate) active_runs: Mutex<HashSet<String>>,
    /// Event key → expiry (epoch ms); the in-memory TTL dedup layer.
    pub(crate) recently_processed: Mutex<HashMap<String, u64>>,
    /// Queue feeding the runtime dispatch loop (DAG unblocks).
    pub(crate) dispatch_tx: tokio::sync::mpsc::UnboundedSender<crate::runtime::DispatchCommand>,
}

impl<T, R, W, C> Engine<T, R, W, C>
where
    T: TrackerAdapter,
    R: AgentRunner,
    W: WorktreeAdapter,
    C: Clock,
{
    /// Build the engine. The returned receiver feeds
    /// [`crate::runtime::run_dispatch_loop`]; dropping it turns queued
    /// dispatches into logged no-ops (fine for tests).
    pub fn new(
        deps: EngineDeps<T, R, W, C>,
    ) -> (
        Self,
        tokio::sync::mpsc::UnboundedReceiver<crate::runtime::DispatchCommand>,
    ) {
        let (dispatch_tx, dispatch_rx) = tokio::sync::mpsc::unbounded_channel();
        let engine = Self {
            store: deps.store,
            projects: deps.projects,
            tracker: deps.tracker,
            runner: deps.runner,
            worktree: deps.worktree,
            notifier: deps.notifier,
            prompts: deps.prompts,
            config: deps.config,
            profiles: deps.profiles,
            clock: deps.clock,
            memory_dir: deps.memory_dir,
            active_runs: Mutex::new(HashSet::new()),
            recently_processed: Mutex::new(HashMap::new()),
            dispatch_tx,
        };
        (engine, dispatch_rx)
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn projects(&self) -> &ProjectStore {
        &self.projects
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn profiles(&self) -> &AgentProfiles {
        &self.profiles
    }

    pub fn tracker(&self) -> &Arc<T> {
        &self.tracker
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub(crate) fn now_ms(&self) -> u64 {
        self.clock.epoch_ms()
    }

    pub(crate) fn artifacts(&self, dispatch: &ActiveDispatch) -> ArtifactWriter {
        ArtifactWriter::new(&dispatch.worktree_path)
    }

    /// Log a CAS rejection. `StaleState` is expected traffic; the other
    /// variants point at a bug or manual state surgery.
    pub(crate) fn log_cas_rejection(&self, op: &str, err: &StateError) {
        match err {
            StateError::Transition(TransitionError::StaleState { id, expected, actual }) => {
                tracing::info!(op, id, %expected, %actual, "state already advanced; standing down");
            }
            other => {
                tracing::error!(op, error = %other, "unexpected CAS rejection");
            }
        }
    }

    /// Post a comment, preferring branded agent identity, always falling
    /// back to a plain comment with a `**[label]**` prefix. Best-effort;
    /// on success the echoed webhook is pre-registered as processed.
    pub(crate) async fn post_comment(
        &self,
        issue_id: &str,
        body: &str,
        agent_id: Option<&str>,
    ) -> Option<String> {
        let profile = agent_id.and_then(|id| self.profiles.by_id(id));
        if let Some(profile) = profile {
            let identity = AgentIdentity {
                agent_id: profile.id.clone(),
                label: profile.label.clone(),
                avatar_url: profile.avatar_url.clone(),
            };
            match self
                .tracker
                .create_comment(issue_id, body, Some(&identity))
                .await
            {
                Ok(comment_id) => {
                    self.suppress_comment_echo(&comment_id);
                    return Some(comment_id);
                }
                Err(e) => {
                    tracing::warn!(issue_id, error = %e, "identity comment failed; posting plain");
                }
            }
            let plain = format!("**[{}]** {}", profile.label, body);
            return self.post_plain(issue_id, &plain).await;
        }
        self.post_plain(issue_id, body).await
    }

    /// Post a user-visible comment under the default agent identity.
    pub async fn post_comment_public(&self, issue_id: &str, body: &str) -> Option<String> {
        self.post_comment(issue_id, body, self.config.default_agent_id.as_deref())
            .await
    }

    async fn post_plain(&self, issue_id: &str, body: &str) -> Option<String> {
        match self.tracker.create_comment(issue_id, body, None).await {
            Ok(comment_id) => {
                self.suppress_comment_echo(&comment_id);
                Some(comment_id)
            }
            Err(e) => {
                tracing::warn!(issue_id, error = %e, "comment posting failed");
                None
            }
        }
    }

    fn suppress_comment_echo(&self, comment_id: &str) {
        if let Err(e) = self.store.pre_register_event(&event_key::comment(comment_id)) {
            tracing::warn!(comment_id, error = %e, "could not pre-register comment echo");
        }
    }

    /// Move the tracker issue into a state picked by `pick`. Best-effort.
    pub(crate) async fn move_issue_to(&self, issue: &IssueDetails, pick: StatePick) {
        let states = match self.tracker.get_team_states(&issue.team.id).await {
            Ok(states) => states,
            Err(e) => {
                tracing::warn!(issue = %issue.identifier, error = %e, "team states unavailable");
                return;
            }
        };
        let Some(state) = pick.select(&states) else {
            tracing::warn!(issue = %issue.identifier, pick = ?pick, "no matching workflow state");
            return;
        };
        let update = IssueUpdate { state_id: Some(state.id.clone()), ..IssueUpdate::default() };
        if let Err(e) = self.tracker.update_issue(&issue.id, update).await {
            tracing::warn!(issue = %issue.identifier, error = %e, "issue state transition failed");
        }
    }

    /// Append a summary note to the orchestrator memory directory.
    pub(crate) fn write_memory(&self, identifier: &str, content: &str) {
        let path = self.memory_dir.join(format!("{identifier}.md"));
        let write = std::fs::create_dir_all(&self.memory_dir)
            .and_then(|_| std::fs::write(&path, content));
        if let Err(e) = write {
            tracing::warn!(identifier, error = %e, "memory write failed");
        }
    }

    /// Template variables shared by the worker and audit prompts.
    pub(crate) fn prompt_vars(
        &self,
        dispatch: &ActiveDispatch,
        issue: &IssueDetails,
        gaps: &[String],
    ) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        vars.insert("identifier".to_string(), issue.identifier.clone());
        vars.insert(
            "title".to_string(),
            sanitize_prompt_input(Some(&issue.title), MAX_PROMPT_INPUT_CHARS),
        );
        vars.insert(
            "description".to_string(),
            sanitize_prompt_input(Some(&issue.description), MAX_PROMPT_INPUT_CHARS),
        );
        vars.insert(
            "worktree_path".to_string(),
            dispatch.worktree_path.display().to_string(),
        );
        vars.insert("attempt".to_string(), (dispatch.attempt + 1).to_string());
        let gaps_section = if gaps.is_empty() {
            String::new()
        } else {
            let mut section = String::from("\nThe previous attempt was rejected. Address:\n");
            for gap in gaps {
                section.push_str(&format!(
                    "- {}\n",
                    sanitize_prompt_input(Some(gap), MAX_PROMPT_INPUT_CHARS)
                ));
            }
            section
        };
        vars.insert("gaps_section".to_string(), gaps_section);
        vars.insert(
            "project_context".to_string(),
            match (&dispatch.project, &issue.project) {
                (Some(_), Some(p)) => format!("\nThis issue is part of project: {}\n", p.name),
                _ => String::new(),
            },
        );
        vars.insert(
            "team_context".to_string(),
            format!("\nTeam: {}\n", issue.team.key),
        );
        vars.insert("guidance".to_string(), String::new());
        vars
    }

    pub(crate) fn run_request(
        &self,
        dispatch: &ActiveDispatch,
        session_key: &SessionKey,
        prompt: String,
    ) -> claw_adapters::runner::AgentRunRequest {
        claw_adapters::runner::AgentRunRequest {
            agent_id: dispatch
                .agent_id
                .clone()
                .or_else(|| self.config.default_agent_id.clone())
                .unwrap_or_else(|| "claude".to_string()),
            session_key: session_key.clone(),
            prompt,
            cwd: dispatch.worktree_path.clone(),
            model: Some(dispatch.model.clone()),
        }
    }
}

/// Which workflow state family a tracker transition targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatePick {
    Triage,
    Completed,
    /// "In Review" by name, or any started state named like review.
    Review,
}

impl StatePick {
    fn select<'a>(&self, states: &'a [WorkflowState]) -> Option<&'a WorkflowState> {
        match self {
            StatePick::Triage => states
                .iter()
                .find(|s| s.state_type == WorkflowStateType::Triage),
            StatePick::Completed => states
                .iter()
                .find(|s| s.state_type == WorkflowStateType::Completed),
            StatePick::Review => states
                .iter()
                .find(|s| s.name == "In Review")
                .or_else(|| {
                    states.iter().find(|s| {
                        s.state_type == WorkflowStateType::Started
                            && s.name.to_lowercase().contains("review")
                    })
                }),
        }
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
