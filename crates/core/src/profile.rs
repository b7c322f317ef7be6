// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent profiles: the identities work can be addressed to.
//!
//! Profiles are loaded from `agent-profiles.json` in the config directory.
//! A comment containing `@<alias>` routes straight to that agent without a
//! classifier round-trip.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One agent identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Stable id handed to the agent runner (e.g. `claude`, `codex`).
    pub id: String,
    /// Mention alias, matched case-insensitively after `@`.
    pub alias: String,
    /// Display label used when posting comments on the agent's behalf.
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Alias-keyed profile lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentProfiles {
    profiles: Vec<AgentProfile>,
}

impl AgentProfiles {
    pub fn new(profiles: Vec<AgentProfile>) -> Self {
        Self { profiles }
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn by_id(&self, id: &str) -> Option<&AgentProfile> {
        self.profiles.iter().find(|p| p.id == id)
    }

    /// Find the first profile whose `@alias` appears in the comment body.
    pub fn mentioned_in(&self, body: &str) -> Option<&AgentProfile> {
        let lower = body.to_lowercase();
        self.profiles
            .iter()
            .find(|p| mention_present(&lower, &p.alias.to_lowercase()))
    }

    /// Alias → id map, useful for logging configured identities.
    pub fn alias_index(&self) -> HashMap<&str, &str> {
        self.profiles
            .iter()
            .map(|p| (p.alias.as_str(), p.id.as_str()))
            .collect()
    }
}

/// `@alias` must be a standalone mention, not a substring of a longer word.
fn mention_present(body_lower: &str, alias_lower: &str) -> bool {
    let needle = format!("@{alias_lower}");
    let mut search_from = 0;
    while let Some(pos) = body_lower[search_from..].find(&needle) {
        let start = search_from + pos;
        let end = start + needle.len();
        let boundary_after = body_lower[end..]
            .chars()
            .next()
            .map(|c| !c.is_alphanumeric())
            .unwrap_or(true);
        if boundary_after {
            return true;
        }
        search_from = end;
    }
    false
}

#[cfg(test)]
#[path = "profile_tests.rs"]
mod tests;
