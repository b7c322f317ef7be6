// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for claw tests in this and downstream crates.

use crate::dispatch::{ActiveDispatch, CompletedDispatch, CompletedStatus, Tier};
use crate::project::{IssueDispatchStatus, ProjectDispatch, ProjectIssue, ProjectStatus};
use indexmap::IndexMap;

/// Completed record matching a terminal dispatch, for store fixtures.
pub fn completed_record(identifier: &str, completed_at: u64) -> CompletedDispatch {
    CompletedDispatch {
        issue_identifier: identifier.to_string(),
        tier: Tier::Medium,
        status: CompletedStatus::Done,
        completed_at,
        pr_url: None,
        project: None,
        total_attempts: 1,
    }
}

/// Linear two-issue project: `first` unblocks `second`.
pub fn chain_project(project_id: &str, first: &str, second: &str) -> ProjectDispatch {
    let mut issues = IndexMap::new();
    issues.insert(
        first.to_string(),
        ProjectIssue {
            issue_id: Some(format!("issue-{}", first.to_lowercase())),
            depends_on: Vec::new(),
            unblocks: vec![second.to_string()],
            dispatch_status: IssueDispatchStatus::Dispatched,
        },
    );
    issues.insert(
        second.to_string(),
        ProjectIssue {
            issue_id: Some(format!("issue-{}", second.to_lowercase())),
            depends_on: vec![first.to_string()],
            unblocks: Vec::new(),
            dispatch_status: IssueDispatchStatus::Pending,
        },
    );
    ProjectDispatch {
        project_id: project_id.to_string(),
        project_name: format!("{project_id} plan"),
        root_identifier: first.to_string(),
        status: ProjectStatus::Dispatching,
        max_concurrent: 2,
        issues,
    }
}

/// Dispatch in `working` with a registered worker session, as left behind
/// by a crash between worker completion and audit trigger.
pub fn recoverable_dispatch(identifier: &str) -> ActiveDispatch {
    use crate::dispatch::DispatchStatus;
    use crate::session::SessionKey;
    ActiveDispatch::builder()
        .issue_identifier(identifier)
        .status(DispatchStatus::Working)
        .worker_session_key(SessionKey::generate())
        .build()
}

#[cfg(feature = "proptest")]
pub mod strategies {
    //! Proptest strategies for state round-trip laws.

    use crate::dispatch::{ActiveDispatch, DispatchStatus, Tier};
    use proptest::prelude::*;

    pub fn tier() -> impl Strategy<Value = Tier> {
        prop_oneof![Just(Tier::Small), Just(Tier::Medium), Just(Tier::High)]
    }

    pub fn nonterminal_status() -> impl Strategy<Value = DispatchStatus> {
        prop_oneof![
            Just(DispatchStatus::Dispatched),
            Just(DispatchStatus::Working),
            Just(DispatchStatus::Auditing),
        ]
    }

    prop_compose! {
        pub fn active_dispatch()(
            n in 1u32..10_000,
            tier in tier(),
            status in nonterminal_status(),
            attempt in 0u32..4,
            dispatched_at in 1u64..10_000_000,
        ) -> ActiveDispatch {
            ActiveDispatch::builder()
                .issue_identifier(format!("ENG-{n}"))
                .issue_id(format!("issue-{n}"))
                .tier(tier)
                .status(status)
                .attempt(attempt)
                .dispatched_at(dispatched_at)
                .build()
        }
    }
}
