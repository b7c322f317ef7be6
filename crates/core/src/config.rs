// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed plugin configuration.
//!
//! Everything tunable flows through [`PluginConfig`], loaded from a TOML
//! document in the config directory. Unrecognized keys are collected so
//! the loader can report them at debug level instead of failing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_MAX_REWORK_ATTEMPTS: u32 = 2;
pub const DEFAULT_DEDUP_TTL_MS: u64 = 60_000;
pub const DEFAULT_DEDUP_SWEEP_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_INACTIVITY_SEC: u64 = 300;
pub const DEFAULT_MAX_TOTAL_SEC: u64 = 3_600;

/// Notification channel family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Desktop,
    Discord,
    Telegram,
}

crate::simple_display! {
    ChannelKind {
        Desktop => "desktop",
        Discord => "discord",
        Telegram => "telegram",
    }
}

impl FromStr for ChannelKind {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "desktop" => Ok(Self::Desktop),
            "discord" => Ok(Self::Discord),
            "telegram" => Ok(Self::Telegram),
            other => Err(UnknownChannel(other.to_string())),
        }
    }
}

/// Channel name not in the supported set.
#[derive(Debug, thiserror::Error)]
#[error("unknown notification channel: {0}")]
pub struct UnknownChannel(pub String);

/// One notification destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyTarget {
    pub channel: ChannelKind,
    /// Channel-specific address: webhook URL, chat id, or empty for desktop.
    #[serde(default)]
    pub target: String,
    /// Identity hint for channels that support posting as an account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

/// Notification behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub targets: Vec<NotifyTarget>,
    /// Per-event enable map; events absent from the map are enabled.
    #[serde(default)]
    pub events: BTreeMap<String, bool>,
    #[serde(default)]
    pub rich_format: bool,
}

/// One managed repository a dispatch worktree can be created from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_branch: Option<String>,
}

/// Recognized plugin configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    #[serde(default = "default_max_rework_attempts")]
    pub max_rework_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_agent_id: Option<String>,
    #[serde(default = "default_dedup_ttl_ms")]
    pub dedup_ttl_ms: u64,
    #[serde(default = "default_dedup_sweep_interval_ms")]
    pub dedup_sweep_interval_ms: u64,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    /// Tracker team key → repo name used for that team's dispatches.
    #[serde(default)]
    pub team_mappings: BTreeMap<String, String>,
    #[serde(default)]
    pub repos: BTreeMap<String, RepoConfig>,
    /// Directory holding global prompt template overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts_path: Option<PathBuf>,
    /// Public URL the tracker should deliver webhooks to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    /// Base repo used when the codex agent needs a scratch checkout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codex_base_repo: Option<String>,
    /// Watchdog: seconds without agent output before a kill.
    #[serde(default = "default_inactivity_sec")]
    pub inactivity_sec: u64,
    /// Watchdog: total wall-clock budget for one agent run.
    #[serde(default = "default_max_total_sec")]
    pub max_total_sec: u64,
    /// Anything we do not recognize; reported at debug by the loader.
    #[serde(flatten)]
    pub unknown: BTreeMap<String, toml::Value>,
}

fn default_max_rework_attempts() -> u32 {
    DEFAULT_MAX_REWORK_ATTEMPTS
}

fn default_dedup_ttl_ms() -> u64 {
    DEFAULT_DEDUP_TTL_MS
}

fn default_dedup_sweep_interval_ms() -> u64 {
    DEFAULT_DEDUP_SWEEP_INTERVAL_MS
}

fn default_inactivity_sec() -> u64 {
    DEFAULT_INACTIVITY_SEC
}

fn default_max_total_sec() -> u64 {
    DEFAULT_MAX_TOTAL_SEC
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            max_rework_attempts: DEFAULT_MAX_REWORK_ATTEMPTS,
            default_agent_id: None,
            dedup_ttl_ms: DEFAULT_DEDUP_TTL_MS,
            dedup_sweep_interval_ms: DEFAULT_DEDUP_SWEEP_INTERVAL_MS,
            notifications: NotificationsConfig::default(),
            team_mappings: BTreeMap::new(),
            repos: BTreeMap::new(),
            prompts_path: None,
            webhook_url: None,
            codex_base_repo: None,
            inactivity_sec: DEFAULT_INACTIVITY_SEC,
            max_total_sec: DEFAULT_MAX_TOTAL_SEC,
            unknown: BTreeMap::new(),
        }
    }
}

impl PluginConfig {
    /// True unless the event is explicitly disabled in the enable map.
    pub fn event_enabled(&self, event: &str) -> bool {
        self.notifications.events.get(event).copied().unwrap_or(true)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
