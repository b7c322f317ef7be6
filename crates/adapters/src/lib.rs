// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! claw-adapters: the narrow contracts to everything outside the core.
//!
//! Each collaborator (issue tracker, sub-agent runner, git worktrees,
//! notification channels, classifier LLM) is consumed through a trait
//! here, with a fake behind the `test-support` feature.

pub mod channel;
pub mod classifier;
pub mod runner;
pub mod subprocess;
pub mod tracker;
pub mod tracker_http;
pub mod worktree;

pub use channel::{ChannelError, ChannelMessage, ChannelSet, ChannelTransport, Embed};
pub use classifier::{ClassifierError, ClassifierTransport};
pub use runner::{AgentRunRequest, AgentRunResult, AgentRunner, CliAgentRunner, RunnerError};
pub use tracker::{
    ActivityContent, AgentIdentity, IssueDetails, IssueUpdate, TrackerAdapter, TrackerError,
    WebhookInfo, WorkflowState, WorkflowStateType,
};
pub use tracker_http::HttpTrackerAdapter;
pub use worktree::{
    GitWorktreeAdapter, WorkspacePrep, WorktreeAdapter, WorktreeError, WorktreeInfo,
    WorktreeStatus,
};

#[cfg(any(test, feature = "test-support"))]
pub use channel::FakeTransport;
#[cfg(any(test, feature = "test-support"))]
pub use classifier::FakeClassifierTransport;
#[cfg(any(test, feature = "test-support"))]
pub use runner::FakeAgentRunner;
#[cfg(any(test, feature = "test-support"))]
pub use tracker::FakeTrackerAdapter;
#[cfg(any(test, feature = "test-support"))]
pub use worktree::FakeWorktreeAdapter;
