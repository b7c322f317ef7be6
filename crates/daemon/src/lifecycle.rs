// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: configuration resolution, logging, engine assembly.

use crate::env;
use claw_adapters::channel::ChannelSet;
use claw_adapters::classifier::HttpClassifierTransport;
use claw_adapters::runner::{AgentCommand, CliAgentRunner};
use claw_adapters::tracker_http::HttpTrackerAdapter;
use claw_adapters::worktree::GitWorktreeAdapter;
use claw_core::config::PluginConfig;
use claw_core::profile::AgentProfiles;
use claw_core::SystemClock;
use claw_engine::notifier::Notifier;
use claw_engine::pipeline::{Engine, EngineDeps};
use claw_engine::prompts::PromptLayers;
use claw_engine::runtime::DispatchCommand;
use claw_storage::projects::ProjectStore;
use claw_storage::state::StateStore;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;

/// The engine with production adapter types.
pub type DaemonEngine =
    Engine<HttpTrackerAdapter, CliAgentRunner, GitWorktreeAdapter, SystemClock>;

/// The router over the production engine and classifier transport.
pub type DaemonRouter = crate::router::Router<
    HttpTrackerAdapter,
    CliAgentRunner,
    GitWorktreeAdapter,
    SystemClock,
    HttpClassifierTransport,
>;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("no config directory could be resolved (set CLAW_CONFIG_DIR)")]
    NoConfigDir,

    #[error("tracker token missing (set {0})")]
    NoTrackerToken(&'static str),

    #[error("config file error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Resolved daemon paths and plugin configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub config_dir: PathBuf,
    pub state_path: PathBuf,
    pub project_state_path: PathBuf,
    pub profiles_path: PathBuf,
    pub memory_dir: PathBuf,
    pub worktrees_dir: PathBuf,
    pub log_path: PathBuf,
    pub listen_addr: String,
    pub plugin: PluginConfig,
}

impl Config {
    pub fn load() -> Result<Self, LifecycleError> {
        let config_dir = env::config_dir().ok_or(LifecycleError::NoConfigDir)?;
        std::fs::create_dir_all(&config_dir)?;

        let plugin = load_plugin_config(&config_dir.join("config.toml"))?;

        Ok(Self {
            state_path: config_dir.join("linear-dispatch-state.json"),
            project_state_path: config_dir.join("project-dispatch-state.json"),
            profiles_path: config_dir.join("agent-profiles.json"),
            memory_dir: config_dir.join("memory"),
            worktrees_dir: config_dir.join("worktrees"),
            log_path: config_dir.join("clawd.log"),
            listen_addr: env::listen_addr(),
            plugin,
            config_dir,
        })
    }
}

fn load_plugin_config(path: &PathBuf) -> Result<PluginConfig, LifecycleError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(PluginConfig::default()),
        Err(e) => return Err(LifecycleError::Io(e)),
    };
    let config: PluginConfig =
        toml::from_str(&raw).map_err(|e| LifecycleError::Config(e.to_string()))?;
    for key in config.unknown.keys() {
        tracing::debug!(key, "unrecognized config key");
    }
    Ok(config)
}

fn load_profiles(path: &PathBuf) -> AgentProfiles {
    match std::fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(profiles) => profiles,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "agent profiles unreadable");
                AgentProfiles::default()
            }
        },
        Err(_) => AgentProfiles::default(),
    }
}

/// Install tracing with an env-filter and a non-blocking file appender.
pub fn setup_logging(config: &Config) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(env::log_filter()))
        .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
        .init();
    Ok(guard)
}

/// Command templates for the interchangeable agent CLIs.
fn agent_commands() -> HashMap<String, AgentCommand> {
    let mut commands = HashMap::new();
    commands.insert(
        "claude".to_string(),
        AgentCommand {
            program: "claude".to_string(),
            args: vec![
                "-p".to_string(),
                "--output-format".to_string(),
                "text".to_string(),
                "--model".to_string(),
                "{model}".to_string(),
            ],
        },
    );
    commands.insert(
        "codex".to_string(),
        AgentCommand {
            program: "codex".to_string(),
            args: vec!["exec".to_string(), "--model".to_string(), "{model}".to_string()],
        },
    );
    commands.insert(
        "gemini".to_string(),
        AgentCommand {
            program: "gemini".to_string(),
            args: vec!["-m".to_string(), "{model}".to_string(), "-p".to_string()],
        },
    );
    commands
}

/// Assemble the production engine.
pub fn build_engine(
    config: &Config,
) -> Result<(Arc<DaemonEngine>, UnboundedReceiver<DispatchCommand>), LifecycleError> {
    let client = reqwest::Client::new();
    let tracker = HttpTrackerAdapter::from_env(client.clone())
        .ok_or(LifecycleError::NoTrackerToken(HttpTrackerAdapter::TOKEN_ENV))?;

    let runner = CliAgentRunner::new(
        agent_commands(),
        Duration::from_secs(config.plugin.inactivity_sec),
        Duration::from_secs(config.plugin.max_total_sec),
    );

    let notifier = if config.plugin.notifications.targets.is_empty() {
        Notifier::noop()
    } else {
        Notifier::new(config.plugin.notifications.clone(), ChannelSet::production())
    };

    let deps = EngineDeps {
        store: StateStore::new(&config.state_path),
        projects: ProjectStore::new(&config.project_state_path),
        tracker: Arc::new(tracker),
        runner: Arc::new(runner),
        worktree: Arc::new(GitWorktreeAdapter::new(&config.worktrees_dir)),
        notifier,
        prompts: PromptLayers::new(config.plugin.prompts_path.clone()),
        config: config.plugin.clone(),
        profiles: load_profiles(&config.profiles_path),
        clock: SystemClock,
        memory_dir: config.memory_dir.clone(),
    };
    let (engine, dispatch_rx) = Engine::new(deps);
    Ok((Arc::new(engine), dispatch_rx))
}

/// Classifier transport from config; a dead endpoint just means the
/// heuristic answers everything.
pub fn build_classifier(config: &Config) -> HttpClassifierTransport {
    let endpoint = config
        .plugin
        .unknown
        .get("classifier_endpoint")
        .and_then(|v| v.as_str())
        .unwrap_or("http://127.0.0.1:11434/v1/completions")
        .to_string();
    HttpClassifierTransport::new(reqwest::Client::new(), endpoint)
}
