// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sub-agent runner: spawn a code-generating CLI, watchdog it, collect
//! output.
//!
//! Two timers guard every run: *inactivity* (no stdout for a bound) and
//! *total wall-clock*. Expiry sends a graceful signal, then a hard kill
//! after a short grace. An inactivity kill is retried once inside the
//! runner; only the second kill surfaces `watchdog_killed` to the caller.

use async_trait::async_trait;
use claw_core::session::SessionKey;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};

/// Grace between the polite signal and the hard kill.
const KILL_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("no runner command configured for agent {0}")]
    UnknownAgent(String),

    #[error("failed to spawn agent process: {0}")]
    Spawn(std::io::Error),

    #[error("agent process I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// One sub-agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRunRequest {
    /// Which agent CLI to run (`claude`, `codex`, `gemini`).
    pub agent_id: String,
    pub session_key: SessionKey,
    /// Full prompt, written to the agent's stdin.
    pub prompt: String,
    pub cwd: PathBuf,
    pub model: Option<String>,
}

/// What came back from a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRunResult {
    pub success: bool,
    pub output: String,
    pub watchdog_killed: bool,
}

/// Contract for the interchangeable agent backends.
#[async_trait]
pub trait AgentRunner: Send + Sync + 'static {
    async fn run(&self, request: AgentRunRequest) -> Result<AgentRunResult, RunnerError>;
}

/// Command template for one agent backend. `{model}` in an argument is
/// replaced with the requested model name.
#[derive(Debug, Clone)]
pub struct AgentCommand {
    pub program: String,
    pub args: Vec<String>,
}

/// Process-backed runner for the agent CLIs.
pub struct CliAgentRunner {
    commands: HashMap<String, AgentCommand>,
    inactivity: Duration,
    max_total: Duration,
}

impl CliAgentRunner {
    pub fn new(
        commands: HashMap<String, AgentCommand>,
        inactivity: Duration,
        max_total: Duration,
    ) -> Self {
        Self { commands, inactivity, max_total }
    }

    fn command_for(&self, request: &AgentRunRequest) -> Result<Command, RunnerError> {
        let template = self
            .commands
            .get(&request.agent_id)
            .ok_or_else(|| RunnerError::UnknownAgent(request.agent_id.clone()))?;
        let mut cmd = Command::new(&template.program);
        for arg in &template.args {
            match (&request.model, arg.contains("{model}")) {
                (Some(model), true) => {
                    cmd.arg(arg.replace("{model}", model));
                }
                (None, true) => {} // model placeholder with no model: drop the arg
                _ => {
                    cmd.arg(arg);
                }
            }
        }
        cmd.current_dir(&request.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        Ok(cmd)
    }

    async fn run_once(&self, request: &AgentRunRequest) -> Result<RunOutcome, RunnerError> {
        let mut child = self
            .command_for(request)?
            .spawn()
            .map_err(RunnerError::Spawn)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(request.prompt.as_bytes()).await?;
            // Close stdin so CLIs reading to EOF start working.
        }

        let stdout = match child.stdout.take() {
            Some(s) => s,
            None => {
                // Should not happen with piped stdout; treat as a failed run.
                let _ = child.kill().await;
                return Ok(RunOutcome::Completed { success: false, output: String::new() });
            }
        };
        let mut lines = BufReader::new(stdout).lines();
        let deadline = tokio::time::Instant::now() + self.max_total;
        let mut output = String::new();

        loop {
            tokio::select! {
                line = lines.next_line() => match line? {
                    Some(line) => {
                        output.push_str(&line);
                        output.push('\n');
                    }
                    None => break, // EOF: agent closed stdout
                },
                _ = tokio::time::sleep(self.inactivity) => {
                    kill_with_grace(&mut child).await;
                    return Ok(RunOutcome::WatchdogKilled { output, cause: KillCause::Inactivity });
                }
                _ = tokio::time::sleep_until(deadline) => {
                    kill_with_grace(&mut child).await;
                    return Ok(RunOutcome::WatchdogKilled { output, cause: KillCause::Total });
                }
            }
        }

        let status = child.wait().await?;
        Ok(RunOutcome::Completed { success: status.success(), output })
    }
}

#[async_trait]
impl AgentRunner for CliAgentRunner {
    async fn run(&self, request: AgentRunRequest) -> Result<AgentRunResult, RunnerError> {
        match self.run_once(&request).await? {
            RunOutcome::Completed { success, output } => {
                Ok(AgentRunResult { success, output, watchdog_killed: false })
            }
            RunOutcome::WatchdogKilled { cause, .. } => {
                tracing::warn!(
                    agent = %request.agent_id,
                    session = %request.session_key.short(),
                    cause = %cause,
                    "agent watchdog fired; retrying once"
                );
                match self.run_once(&request).await? {
                    RunOutcome::Completed { success, output } => {
                        Ok(AgentRunResult { success, output, watchdog_killed: false })
                    }
                    RunOutcome::WatchdogKilled { output, cause } => {
                        tracing::warn!(
                            agent = %request.agent_id,
                            session = %request.session_key.short(),
                            cause = %cause,
                            "agent watchdog fired twice; surfacing kill"
                        );
                        Ok(AgentRunResult { success: false, output, watchdog_killed: true })
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KillCause {
    Inactivity,
    Total,
}

claw_core::simple_display! {
    KillCause {
        Inactivity => "inactivity",
        Total => "total wall-clock",
    }
}

enum RunOutcome {
    Completed { success: bool, output: String },
    WatchdogKilled { output: String, cause: KillCause },
}

/// Polite termination first, hard kill after the grace window.
async fn kill_with_grace(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok() {
            return;
        }
    }
    if let Err(e) = child.kill().await {
        tracing::warn!(error = %e, "hard kill of agent process failed");
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeRunnerState {
        scripted: VecDeque<AgentRunResult>,
        requests: Vec<AgentRunRequest>,
    }

    /// Scripted runner: returns queued results in order, then a default
    /// success whose output doubles as a passing verdict (so unscripted
    /// pipelines run end to end). Records every request.
    #[derive(Clone, Default)]
    pub struct FakeAgentRunner {
        state: Arc<Mutex<FakeRunnerState>>,
    }

    impl FakeAgentRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_result(&self, result: AgentRunResult) {
            self.state.lock().scripted.push_back(result);
        }

        pub fn push_success(&self, output: &str) {
            self.push_result(AgentRunResult {
                success: true,
                output: output.to_string(),
                watchdog_killed: false,
            });
        }

        pub fn push_watchdog_kill(&self) {
            self.push_result(AgentRunResult {
                success: false,
                output: String::new(),
                watchdog_killed: true,
            });
        }

        pub fn requests(&self) -> Vec<AgentRunRequest> {
            self.state.lock().requests.clone()
        }
    }

    #[async_trait]
    impl AgentRunner for FakeAgentRunner {
        async fn run(&self, request: AgentRunRequest) -> Result<AgentRunResult, RunnerError> {
            let mut state = self.state.lock();
            state.requests.push(request);
            Ok(state.scripted.pop_front().unwrap_or(AgentRunResult {
                success: true,
                output: r#"done {"pass": true, "criteria": ["reviewed"], "gaps": [], "testResults": "not run"}"#
                    .to_string(),
                watchdog_killed: false,
            }))
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeAgentRunner;

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
