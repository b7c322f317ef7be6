// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project-scoped dispatch plans.
//!
//! A project dispatch tracks a set of issues with a dependency DAG between
//! them. Issues become eligible for dispatch when every dependency is done;
//! `max_concurrent` caps how many run at once within the project.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Overall status of a project plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Plan under construction (planning subsystem owns this phase)
    Planning,
    /// Issues are being dispatched as the DAG unblocks them
    Dispatching,
    /// Every issue reached done
    Done,
    /// A stuck issue blocks all remaining progress
    Stuck,
}

crate::simple_display! {
    ProjectStatus {
        Planning => "planning",
        Dispatching => "dispatching",
        Done => "done",
        Stuck => "stuck",
    }
}

/// Per-issue dispatch progress inside a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueDispatchStatus {
    Pending,
    Dispatched,
    Done,
    Stuck,
}

crate::simple_display! {
    IssueDispatchStatus {
        Pending => "pending",
        Dispatched => "dispatched",
        Done => "done",
        Stuck => "stuck",
    }
}

impl Default for IssueDispatchStatus {
    fn default() -> Self {
        IssueDispatchStatus::Pending
    }
}

/// One issue inside a project plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProjectIssue {
    /// The tracker's opaque id, needed when the issue is dispatched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_id: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub unblocks: Vec<String>,
    #[serde(default)]
    pub dispatch_status: IssueDispatchStatus,
}

/// A project-scoped dispatch plan with a dependency DAG over its issues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDispatch {
    pub project_id: String,
    pub project_name: String,
    /// Identifier of the root issue the plan was built from.
    pub root_identifier: String,
    pub status: ProjectStatus,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: u32,
    /// Insertion order is preserved so unblocking is deterministic.
    #[serde(default)]
    pub issues: IndexMap<String, ProjectIssue>,
}

fn default_max_concurrent() -> u32 {
    2
}

impl ProjectDispatch {
    /// Count of issues currently dispatched.
    pub fn dispatched_count(&self) -> usize {
        self.issues
            .values()
            .filter(|i| i.dispatch_status == IssueDispatchStatus::Dispatched)
            .count()
    }

    /// Count of issues done.
    pub fn done_count(&self) -> usize {
        self.issues
            .values()
            .filter(|i| i.dispatch_status == IssueDispatchStatus::Done)
            .count()
    }

    pub fn all_done(&self) -> bool {
        self.issues
            .values()
            .all(|i| i.dispatch_status == IssueDispatchStatus::Done)
    }

    /// Issues whose dependencies are all done and which have not started yet.
    pub fn ready_issues(&self) -> Vec<String> {
        self.issues
            .iter()
            .filter(|(_, issue)| issue.dispatch_status == IssueDispatchStatus::Pending)
            .filter(|(_, issue)| {
                issue.depends_on.iter().all(|dep| {
                    self.issues
                        .get(dep)
                        .map(|d| d.dispatch_status == IssueDispatchStatus::Done)
                        // Dependencies outside the plan can never complete;
                        // treat them as unsatisfied rather than unblocking.
                        .unwrap_or(false)
                })
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// True when a stuck issue leaves no pending issue able to ever run.
    ///
    /// Walks forward from stuck issues: a pending issue that transitively
    /// depends on a stuck one is unreachable. If nothing is dispatched and
    /// every pending issue is unreachable, the project cannot progress.
    pub fn is_blocked(&self) -> bool {
        let stuck: HashSet<&str> = self
            .issues
            .iter()
            .filter(|(_, i)| i.dispatch_status == IssueDispatchStatus::Stuck)
            .map(|(id, _)| id.as_str())
            .collect();
        if stuck.is_empty() {
            return false;
        }
        if self.dispatched_count() > 0 {
            return false;
        }

        let pending: Vec<(&String, &ProjectIssue)> = self
            .issues
            .iter()
            .filter(|(_, i)| i.dispatch_status == IssueDispatchStatus::Pending)
            .collect();
        if pending.is_empty() {
            return true;
        }

        pending
            .iter()
            .all(|(id, _)| self.depends_transitively_on_stuck(id, &stuck))
    }

    fn depends_transitively_on_stuck(&self, id: &str, stuck: &HashSet<&str>) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![id.to_string()];
        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let Some(issue) = self.issues.get(&current) else {
                continue;
            };
            for dep in &issue.depends_on {
                if stuck.contains(dep.as_str()) {
                    return true;
                }
                stack.push(dep.clone());
            }
        }
        false
    }

    /// Validate that the `depends_on` graph is acyclic.
    pub fn validate_acyclic(&self) -> Result<(), ProjectGraphError> {
        let mut visiting = HashSet::new();
        let mut done = HashSet::new();
        for id in self.issues.keys() {
            self.visit(id, &mut visiting, &mut done)?;
        }
        Ok(())
    }

    fn visit(
        &self,
        id: &str,
        visiting: &mut HashSet<String>,
        done: &mut HashSet<String>,
    ) -> Result<(), ProjectGraphError> {
        if done.contains(id) {
            return Ok(());
        }
        if !visiting.insert(id.to_string()) {
            return Err(ProjectGraphError::Cycle { at: id.to_string() });
        }
        if let Some(issue) = self.issues.get(id) {
            for dep in &issue.depends_on {
                self.visit(dep, visiting, done)?;
            }
        }
        visiting.remove(id);
        done.insert(id.to_string());
        Ok(())
    }
}

/// Dependency-graph validation failure.
#[derive(Debug, thiserror::Error)]
pub enum ProjectGraphError {
    #[error("dependency cycle through {at}")]
    Cycle { at: String },
}

#[cfg(test)]
#[path = "project_tests.rs"]
mod tests;
