// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatch data model and status state machine.
//!
//! A dispatch is one tracked change attempt on one tracker issue. It owns a
//! git worktree and progresses `dispatched → working → auditing → done`,
//! with `failed` and `stuck` as terminal escape hatches and the
//! `auditing → working` rework loop bounded by configuration.

use crate::session::SessionKey;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complexity class assigned at dispatch time; selects the worker model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Small,
    #[default]
    Medium,
    High,
}

crate::simple_display! {
    Tier {
        Small => "small",
        Medium => "medium",
        High => "high",
    }
}

/// Lifecycle status of an active dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    /// Registered, worker not yet started
    Dispatched,
    /// Worker running (or rework requested)
    Working,
    /// Audit running
    Auditing,
    /// Audit passed; terminal
    Done,
    /// Startup or infrastructure failure; terminal
    Failed,
    /// Escalated to a human; terminal, carries a reason
    Stuck,
}

crate::simple_display! {
    DispatchStatus {
        Dispatched => "dispatched",
        Working => "working",
        Auditing => "auditing",
        Done => "done",
        Failed => "failed",
        Stuck => "stuck",
    }
}

impl DispatchStatus {
    /// Terminal states admit no outbound transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Stuck)
    }

    /// The allowed transition table.
    ///
    /// `auditing → working` is the rework loop; everything reaching `done`,
    /// `failed`, or `stuck` stays there.
    pub fn can_transition_to(&self, to: DispatchStatus) -> bool {
        use DispatchStatus::*;
        matches!(
            (self, to),
            (Dispatched, Working)
                | (Dispatched, Failed)
                | (Dispatched, Stuck)
                | (Working, Auditing)
                | (Working, Failed)
                | (Working, Stuck)
                | (Auditing, Done)
                | (Auditing, Working)
                | (Auditing, Stuck)
        )
    }
}

/// One worktree of a multi-repo dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchWorktree {
    pub repo: String,
    pub path: PathBuf,
    pub branch: String,
}

/// One tracked change attempt on one issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveDispatch {
    /// Human identifier, e.g. `ENG-472`. Primary key.
    pub issue_identifier: String,
    /// The tracker's opaque issue id.
    pub issue_id: String,
    pub worktree_path: PathBuf,
    pub branch: String,
    #[serde(default)]
    pub tier: Tier,
    pub model: String,
    /// Agent backend override; the configured default applies when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub status: DispatchStatus,
    pub dispatched_at: u64,
    /// Rework counter; 0 on first attempt, incremented on `auditing → working`.
    #[serde(default)]
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_session_key: Option<SessionKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_session_key: Option<SessionKey>,
    /// Set iff `status == Stuck`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stuck_reason: Option<String>,
    /// Project id when this dispatch belongs to a project plan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// Secondary worktrees for multi-repo dispatches.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub worktrees: Vec<DispatchWorktree>,
}

impl ActiveDispatch {
    /// Structural invariant check: `stuck_reason` present iff stuck.
    pub fn stuck_reason_consistent(&self) -> bool {
        (self.status == DispatchStatus::Stuck) == self.stuck_reason.is_some()
    }
}

crate::builder! {
    pub struct DispatchBuilder => ActiveDispatch {
        into {
            issue_identifier: String = "ENG-1",
            issue_id: String = "issue-uuid-1",
            worktree_path: PathBuf = PathBuf::from("/tmp/workdir/eng-1"),
            branch: String = "claw/eng-1",
            model: String = "default-model",
        }
        set {
            tier: Tier = Tier::Medium,
            status: DispatchStatus = DispatchStatus::Dispatched,
            dispatched_at: u64 = 1_000_000,
            attempt: u32 = 0,
            worktrees: Vec<DispatchWorktree> = Vec::new(),
        }
        option {
            agent_id: String = None,
            worker_session_key: SessionKey = None,
            audit_session_key: SessionKey = None,
            stuck_reason: String = None,
            project: String = None,
        }
    }
}

/// Final status recorded for a completed dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletedStatus {
    Done,
    Failed,
}

crate::simple_display! {
    CompletedStatus {
        Done => "done",
        Failed => "failed",
    }
}

/// Post-terminal record retained until pruned by age.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedDispatch {
    pub issue_identifier: String,
    #[serde(default)]
    pub tier: Tier,
    pub status: CompletedStatus,
    pub completed_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default)]
    pub total_attempts: u32,
}

/// Which pipeline phase a sub-agent session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Worker,
    Audit,
}

crate::simple_display! {
    SessionPhase {
        Worker => "worker",
        Audit => "audit",
    }
}

/// Maps a session key back to the dispatch that owns the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMapping {
    /// Issue identifier of the owning dispatch.
    pub dispatch_id: String,
    pub phase: SessionPhase,
    pub attempt: u32,
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
