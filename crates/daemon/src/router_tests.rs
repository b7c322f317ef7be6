// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use claw_adapters::channel::ChannelSet;
use claw_adapters::classifier::FakeClassifierTransport;
use claw_adapters::tracker::{IssueDetails, IssueTeam};
use claw_adapters::{FakeAgentRunner, FakeTrackerAdapter, FakeWorktreeAdapter};
use claw_core::config::{PluginConfig, RepoConfig};
use claw_core::profile::{AgentProfile, AgentProfiles};
use claw_core::FakeClock;
use claw_engine::notifier::Notifier;
use claw_engine::pipeline::EngineDeps;
use claw_engine::prompts::PromptLayers;
use claw_storage::projects::ProjectStore;
use claw_storage::state::StateStore;
use serde_json::json;

type TestRouter = Router<
    FakeTrackerAdapter,
    FakeAgentRunner,
    FakeWorktreeAdapter,
    FakeClock,
    FakeClassifierTransport,
>;

struct Fixture {
    _dir: tempfile::TempDir,
    router: TestRouter,
    tracker: FakeTrackerAdapter,
    runner: FakeAgentRunner,
}

fn fixture_with_classifier(classifier: FakeClassifierTransport) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let mut config = PluginConfig::default();
    config.repos.insert(
        "main".to_string(),
        RepoConfig { path: dir.path().join("repo"), base_branch: None },
    );

    let tracker = FakeTrackerAdapter::new();
    let runner = FakeAgentRunner::new();
    let deps = EngineDeps {
        store: StateStore::new(dir.path().join("linear-dispatch-state.json")),
        projects: ProjectStore::new(dir.path().join("project-dispatch-state.json")),
        tracker: Arc::new(tracker.clone()),
        runner: Arc::new(runner.clone()),
        worktree: Arc::new(FakeWorktreeAdapter::new(dir.path().join("worktrees"))),
        notifier: Notifier::new(Default::default(), ChannelSet::new()),
        prompts: PromptLayers::new(None),
        config,
        profiles: AgentProfiles::new(vec![AgentProfile {
            id: "claude".to_string(),
            alias: "claw".to_string(),
            label: "Claw".to_string(),
            avatar_url: None,
        }]),
        clock: FakeClock::new(),
        memory_dir: dir.path().join("memory"),
    };
    let (engine, _rx) = claw_engine::pipeline::Engine::new(deps);
    let router = Router::new(Arc::new(engine), IntentClassifier::new(classifier));
    Fixture { _dir: dir, router, tracker, runner }
}

fn fixture() -> Fixture {
    fixture_with_classifier(FakeClassifierTransport::new())
}

fn seed_issue(fixture: &Fixture, issue_id: &str, identifier: &str) {
    let issue = IssueDetails {
        id: issue_id.to_string(),
        identifier: identifier.to_string(),
        title: "Fix flaky retry".to_string(),
        description: String::new(),
        team: IssueTeam {
            id: "team-eng".to_string(),
            key: "ENG".to_string(),
            issue_estimation_type: None,
        },
        ..IssueDetails::default()
    };
    let _ = fixture.tracker.clone().with_issue(issue);
}

fn session_created(session_id: &str, issue_id: &str) -> serde_json::Value {
    json!({
        "type": "AgentSessionEvent",
        "action": "created",
        "data": { "sessionId": session_id, "issue": { "id": issue_id } }
    })
}

fn comment_created(comment_id: &str, issue_id: &str, author: &str, body: &str) -> serde_json::Value {
    json!({
        "type": "Comment",
        "action": "create",
        "data": {
            "id": comment_id,
            "body": body,
            "issue": { "id": issue_id },
            "user": { "id": author }
        }
    })
}

#[tokio::test]
async fn session_created_starts_a_dispatch() {
    let fx = fixture();
    seed_issue(&fx, "issue-1", "ENG-1");
    fx.router.dispatch(session_created("sess-X", "issue-1")).await;

    // Worker and audit both ran (default fake results succeed).
    assert_eq!(fx.runner.requests().len(), 2);
    let state = fx.router.engine().store().read().unwrap();
    assert!(!state.dispatches.completed.is_empty());
}

#[tokio::test]
async fn duplicate_session_webhook_does_no_second_work() {
    let fx = fixture();
    seed_issue(&fx, "issue-1", "ENG-1");
    fx.router.dispatch(session_created("sess-X", "issue-1")).await;
    let after_first = fx.runner.requests().len();

    fx.router.dispatch(session_created("sess-X", "issue-1")).await;
    assert_eq!(fx.runner.requests().len(), after_first);
}

#[tokio::test]
async fn in_flight_issue_suppresses_session_event() {
    let fx = fixture();
    seed_issue(&fx, "issue-1", "ENG-1");
    assert!(fx.router.engine().begin_run("issue-1"));

    fx.router.dispatch(session_created("sess-Y", "issue-1")).await;
    assert!(fx.runner.requests().is_empty());
}

#[tokio::test]
async fn own_comment_echo_is_skipped_by_viewer_guard() {
    let fx = fixture();
    seed_issue(&fx, "issue-1", "ENG-1");
    // The fake tracker's viewer id.
    let payload = comment_created("c-1", "issue-1", "viewer-claw", "please fix this");
    fx.router.dispatch(payload).await;
    assert!(fx.runner.requests().is_empty());
}

#[tokio::test]
async fn mention_fast_path_skips_classifier() {
    let classifier = FakeClassifierTransport::new();
    let fx = fixture_with_classifier(classifier.clone());
    seed_issue(&fx, "issue-1", "ENG-1");

    fx.router
        .dispatch(comment_created("c-2", "issue-1", "user-1", "@claw take this one"))
        .await;

    // Dispatched without consulting the classifier.
    assert!(classifier.prompts().is_empty());
    assert!(!fx.runner.requests().is_empty());
    assert_eq!(fx.runner.requests()[0].agent_id, "claude");
}

#[tokio::test]
async fn request_work_intent_dispatches_default_agent() {
    let classifier = FakeClassifierTransport::new()
        .respond_with(r#"{"intent": "request_work", "reasoning": "wants a fix"}"#);
    let fx = fixture_with_classifier(classifier);
    seed_issue(&fx, "issue-1", "ENG-1");

    fx.router
        .dispatch(comment_created("c-3", "issue-1", "user-1", "handle this please"))
        .await;
    assert_eq!(fx.runner.requests().len(), 2);
}

#[tokio::test]
async fn close_intent_closes_instead_of_dispatching() {
    let classifier = FakeClassifierTransport::new()
        .respond_with(r#"{"intent": "close_issue", "reasoning": "done"}"#);
    let fx = fixture_with_classifier(classifier);
    seed_issue(&fx, "issue-1", "ENG-1");

    fx.router
        .dispatch(comment_created("c-4", "issue-1", "user-1", "all fixed, close it"))
        .await;

    assert!(fx.runner.requests().is_empty());
    assert_eq!(fx.tracker.last_state_id("issue-1").as_deref(), Some("st-done"));
}

#[tokio::test]
async fn general_intent_does_nothing() {
    let classifier = FakeClassifierTransport::new()
        .respond_with(r#"{"intent": "general", "reasoning": "chatter"}"#);
    let fx = fixture_with_classifier(classifier);
    seed_issue(&fx, "issue-1", "ENG-1");

    fx.router
        .dispatch(comment_created("c-5", "issue-1", "user-1", "thanks!"))
        .await;
    assert!(fx.runner.requests().is_empty());
    assert!(fx.tracker.comments().is_empty());
}

#[tokio::test]
async fn plan_intents_are_acknowledged_not_dispatched() {
    let classifier = FakeClassifierTransport::new()
        .respond_with(r#"{"intent": "plan_start", "reasoning": "epic breakdown"}"#);
    let fx = fixture_with_classifier(classifier);
    seed_issue(&fx, "issue-1", "ENG-1");

    fx.router
        .dispatch(comment_created("c-6", "issue-1", "user-1", "plan this epic"))
        .await;

    assert!(fx.runner.requests().is_empty());
    assert!(fx
        .tracker
        .comments()
        .iter()
        .any(|c| c.body.contains("Planning request noted")));
}

#[tokio::test]
async fn duplicate_comment_id_is_ignored() {
    let classifier = FakeClassifierTransport::new()
        .respond_with(r#"{"intent": "general", "reasoning": ""}"#);
    let fx = fixture_with_classifier(classifier.clone());
    seed_issue(&fx, "issue-1", "ENG-1");

    let payload = comment_created("c-7", "issue-1", "user-1", "hello");
    fx.router.dispatch(payload.clone()).await;
    fx.router.dispatch(payload).await;

    assert_eq!(classifier.prompts().len(), 1);
}

#[tokio::test]
async fn assignment_to_viewer_dispatches() {
    let fx = fixture();
    seed_issue(&fx, "issue-1", "ENG-1");
    let payload = json!({
        "type": "Issue",
        "action": "update",
        "data": { "id": "issue-1", "assignee": { "id": "viewer-claw" } },
        "updatedFrom": { "assigneeId": "someone-else" }
    });
    fx.router.dispatch(payload).await;
    assert_eq!(fx.runner.requests().len(), 2);
}

#[tokio::test]
async fn assignment_to_someone_else_is_ignored() {
    let fx = fixture();
    seed_issue(&fx, "issue-1", "ENG-1");
    let payload = json!({
        "type": "Issue",
        "action": "update",
        "data": { "id": "issue-1", "assignee": { "id": "human-7" } },
        "updatedFrom": { "assigneeId": null }
    });
    fx.router.dispatch(payload).await;
    assert!(fx.runner.requests().is_empty());
}

#[tokio::test]
async fn unchanged_assignment_update_is_ignored() {
    let fx = fixture();
    seed_issue(&fx, "issue-1", "ENG-1");
    let payload = json!({
        "type": "Issue",
        "action": "update",
        "data": { "id": "issue-1", "assignee": { "id": "viewer-claw" } },
        "updatedFrom": { "title": "old title" }
    });
    fx.router.dispatch(payload).await;
    assert!(fx.runner.requests().is_empty());
}

#[tokio::test]
async fn issue_create_runs_auto_triage_once() {
    let fx = fixture();
    seed_issue(&fx, "issue-9", "ENG-9");
    let payload = json!({
        "type": "Issue",
        "action": "create",
        "data": { "id": "issue-9" }
    });
    fx.router.dispatch(payload.clone()).await;
    fx.router.dispatch(payload).await;

    let triage_comments = fx
        .tracker
        .comments()
        .iter()
        .filter(|c| c.body.starts_with("Triage:"))
        .count();
    assert_eq!(triage_comments, 1);
}

#[tokio::test]
async fn unknown_event_types_are_logged_and_dropped() {
    let fx = fixture();
    fx.router
        .dispatch(json!({ "type": "Reaction", "action": "create", "data": {} }))
        .await;
    fx.router
        .dispatch(json!({ "type": "AppUserNotification", "action": "x" }))
        .await;
    assert!(fx.runner.requests().is_empty());
}
