//! Shared harness: an engine and router wired to fake adapters.

use claw_adapters::channel::{ChannelSet, FakeTransport};
use claw_adapters::classifier::FakeClassifierTransport;
use claw_adapters::tracker::{IssueDetails, IssueTeam};
use claw_adapters::{FakeAgentRunner, FakeTrackerAdapter, FakeWorktreeAdapter};
use claw_core::config::{ChannelKind, NotifyTarget, PluginConfig, RepoConfig};
use claw_core::profile::{AgentProfile, AgentProfiles};
use claw_core::FakeClock;
use claw_daemon::Router;
use claw_engine::classify::IntentClassifier;
use claw_engine::notifier::Notifier;
use claw_engine::pipeline::{Engine, EngineDeps};
use claw_engine::prompts::PromptLayers;
use claw_engine::runtime::DispatchCommand;
use claw_storage::projects::ProjectStore;
use claw_storage::state::StateStore;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

pub type SpecEngine = Engine<FakeTrackerAdapter, FakeAgentRunner, FakeWorktreeAdapter, FakeClock>;
pub type SpecRouter = Router<
    FakeTrackerAdapter,
    FakeAgentRunner,
    FakeWorktreeAdapter,
    FakeClock,
    FakeClassifierTransport,
>;

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub engine: Arc<SpecEngine>,
    pub router: SpecRouter,
    pub tracker: FakeTrackerAdapter,
    pub runner: FakeAgentRunner,
    pub worktree: FakeWorktreeAdapter,
    pub transport: FakeTransport,
    pub clock: FakeClock,
    pub dispatch_rx: UnboundedReceiver<DispatchCommand>,
}

pub fn harness() -> Harness {
    harness_with(PluginConfig::default())
}

pub fn harness_with(mut config: PluginConfig) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let transport = FakeTransport::new();
    config.notifications.targets.push(NotifyTarget {
        channel: ChannelKind::Discord,
        target: "spec-hook".to_string(),
        account_id: None,
    });
    if config.repos.is_empty() {
        config.repos.insert(
            "main".to_string(),
            RepoConfig { path: dir.path().join("repo"), base_branch: None },
        );
    }

    let tracker = FakeTrackerAdapter::new();
    let runner = FakeAgentRunner::new();
    let worktree = FakeWorktreeAdapter::new(dir.path().join("worktrees"));
    let clock = FakeClock::new();
    let channels = ChannelSet::new().with(ChannelKind::Discord, Arc::new(transport.clone()));

    let deps = EngineDeps {
        store: StateStore::new(dir.path().join("linear-dispatch-state.json")),
        projects: ProjectStore::new(dir.path().join("project-dispatch-state.json")),
        tracker: Arc::new(tracker.clone()),
        runner: Arc::new(runner.clone()),
        worktree: Arc::new(worktree.clone()),
        notifier: Notifier::new(config.notifications.clone(), channels),
        prompts: PromptLayers::new(None),
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
    let engine = Arc::new(engine);
    let router = Router::new(
        Arc::clone(&engine),
        IntentClassifier::new(FakeClassifierTransport::new()),
    );

    Harness {
        dir,
        engine,
        router,
        tracker,
        runner,
        worktree,
        transport,
        clock,
        dispatch_rx,
    }
}

impl Harness {
    pub fn seed_issue(&self, issue_id: &str, identifier: &str) {
        let issue = IssueDetails {
            id: issue_id.to_string(),
            identifier: identifier.to_string(),
            title: format!("Spec work for {identifier}"),
            description: "As observed in the field.".to_string(),
            team: IssueTeam {
                id: "team-eng".to_string(),
                key: "ENG".to_string(),
                issue_estimation_type: None,
            },
            ..IssueDetails::default()
        };
        let _ = self.tracker.clone().with_issue(issue);
    }

    pub fn notified(&self) -> Vec<String> {
        self.transport
            .sent()
            .into_iter()
            .map(|s| s.message.text)
            .collect()
    }

    pub fn comment_bodies(&self) -> Vec<String> {
        self.tracker.comments().into_iter().map(|c| c.body).collect()
    }
}

pub fn passing_verdict_output() -> String {
    r#"{"pass": true, "criteria": ["tests pass"], "gaps": [], "testResults": "ok"}"#.to_string()
}

pub fn failing_verdict_output(gap: &str) -> String {
    format!(r#"{{"pass": false, "criteria": [], "gaps": ["{gap}"], "testResults": ""}}"#)
}
