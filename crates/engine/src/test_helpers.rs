// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine tests: an engine wired to fakes.

use crate::notifier::Notifier;
use crate::pipeline::{Engine, EngineDeps};
use crate::prompts::PromptLayers;
use crate::runtime::DispatchCommand;
use claw_adapters::channel::{ChannelSet, FakeTransport};
use claw_adapters::tracker::{IssueDetails, IssueTeam};
use claw_adapters::{FakeAgentRunner, FakeTrackerAdapter, FakeWorktreeAdapter};
use claw_core::config::{ChannelKind, NotifyTarget, PluginConfig, RepoConfig};
use claw_core::profile::{AgentProfile, AgentProfiles};
use claw_core::{ActiveDispatch, FakeClock};
use claw_storage::projects::ProjectStore;
use claw_storage::state::StateStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

pub(crate) type TestEngine =
    Engine<FakeTrackerAdapter, FakeAgentRunner, FakeWorktreeAdapter, FakeClock>;

pub(crate) struct TestContext {
    pub dir: tempfile::TempDir,
    pub engine: TestEngine,
    pub tracker: FakeTrackerAdapter,
    pub runner: FakeAgentRunner,
    pub worktree: FakeWorktreeAdapter,
    pub transport: FakeTransport,
    pub clock: FakeClock,
    pub dispatch_rx: UnboundedReceiver<DispatchCommand>,
}

pub(crate) fn setup() -> TestContext {
    setup_with(PluginConfig::default())
}

pub(crate) fn setup_with(mut config: PluginConfig) -> TestContext {
    let dir = tempfile::tempdir().unwrap();

    // One notification target through the recording transport.
    let transport = FakeTransport::new();
    config.notifications.targets.push(NotifyTarget {
        channel: ChannelKind::Discord,
        target: "hook-test".to_string(),
        account_id: None,
    });
    if config.repos.is_empty() {
        config.repos.insert(
            "main".to_string(),
            RepoConfig { path: dir.path().join("repo"), base_branch: None },
        );
    }
    let channels = ChannelSet::new().with(ChannelKind::Discord, Arc::new(transport.clone()));

    let tracker = FakeTrackerAdapter::new();
    let runner = FakeAgentRunner::new();
    let worktree = FakeWorktreeAdapter::new(dir.path().join("worktrees"));
    let clock = FakeClock::new();

    let deps = EngineDeps {
        store: StateStore::new(dir.path().join("linear-dispatch-state.json")),
        projects: ProjectStore::new(dir.path().join("project-dispatch-state.json")),
        tracker: Arc::new(tracker.clone()),
        runner: Arc::new(runner.clone()),
        worktree: Arc::new(worktree.clone()),
        notifier: Notifier::new(config.notifications.clone(), channels),
        prompts: PromptLayers::new(config.prompts_path.clone()),
        config,
        profiles: AgentProfiles::new(vec![AgentProfile {
            id: "claude".to_string(),
            alias: "claw".to_string(),
            label: "Claw".to_string(),
            avatar_url: None,
        }]),
        clock: clock.clone(),
        memory_dir: dir.path().join("memory"),
    };
    let (engine, dispatch_rx) = Engine::new(deps);

    TestContext {
        dir,
        engine,
        tracker,
        runner,
        worktree,
        transport,
        clock,
        dispatch_rx,
    }
}

impl TestContext {
    /// Seed an issue on the fake tracker.
    pub fn seed_issue(&self, issue_id: &str, identifier: &str) -> IssueDetails {
        let issue = IssueDetails {
            id: issue_id.to_string(),
            identifier: identifier.to_string(),
            title: format!("Fix something in {identifier}"),
            description: "Observed failure in production.".to_string(),
            team: IssueTeam {
                id: "team-eng".to_string(),
                key: "ENG".to_string(),
                issue_estimation_type: None,
            },
            ..IssueDetails::default()
        };
        // with_issue consumes and returns the adapter; ours is shared state.
        let _ = self.tracker.clone().with_issue(issue.clone());
        issue
    }

    /// Register an already-created dispatch pointing at a real temp dir.
    pub fn register_dispatch(&self, issue_id: &str, identifier: &str) -> ActiveDispatch {
        let worktree_path = self.dir.path().join("worktrees").join(identifier.to_lowercase());
        std::fs::create_dir_all(&worktree_path).unwrap();
        let dispatch = ActiveDispatch::builder()
            .issue_identifier(identifier)
            .issue_id(issue_id)
            .worktree_path(worktree_path)
            .build();
        self.engine.store().register_dispatch(dispatch.clone()).unwrap();
        dispatch
    }

    /// Notification texts in send order.
    pub fn notified(&self) -> Vec<String> {
        self.transport
            .sent()
            .into_iter()
            .map(|s| s.message.text)
            .collect()
    }

    /// All comment bodies posted to the tracker.
    pub fn comment_bodies(&self) -> Vec<String> {
        self.tracker.comments().into_iter().map(|c| c.body).collect()
    }

    pub fn memory_path(&self, identifier: &str) -> PathBuf {
        self.dir.path().join("memory").join(format!("{identifier}.md"))
    }
}

/// An audit output whose last JSON fragment is a passing verdict.
pub(crate) fn passing_audit_output() -> String {
    r#"Reviewed the change.
{"pass": true, "criteria": ["tests pass"], "gaps": [], "testResults": "ok"}"#
        .to_string()
}

pub(crate) fn failing_audit_output(gap: &str) -> String {
    format!(r#"{{"pass": false, "criteria": [], "gaps": ["{gap}"], "testResults": "2 failed"}}"#)
}
