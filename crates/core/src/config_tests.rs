// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn empty_document_yields_defaults() {
    let config: PluginConfig = toml::from_str("").unwrap();
    assert_eq!(config.max_rework_attempts, DEFAULT_MAX_REWORK_ATTEMPTS);
    assert_eq!(config.dedup_ttl_ms, DEFAULT_DEDUP_TTL_MS);
    assert_eq!(config.inactivity_sec, DEFAULT_INACTIVITY_SEC);
    assert!(config.notifications.targets.is_empty());
    assert!(config.unknown.is_empty());
}

#[test]
fn recognized_keys_parse() {
    let config: PluginConfig = toml::from_str(
        r#"
max_rework_attempts = 3
default_agent_id = "claude"
webhook_url = "https://claw.example.com/webhook"

[team_mappings]
ENG = "backend"

[repos.backend]
path = "/srv/repos/backend"
base_branch = "main"

[notifications]
rich_format = true

[[notifications.targets]]
channel = "discord"
target = "https://discord.example/hook"

[notifications.events]
working = false
"#,
    )
    .unwrap();

    assert_eq!(config.max_rework_attempts, 3);
    assert_eq!(config.default_agent_id.as_deref(), Some("claude"));
    assert_eq!(config.team_mappings["ENG"], "backend");
    assert_eq!(config.repos["backend"].base_branch.as_deref(), Some("main"));
    assert!(config.notifications.rich_format);
    assert_eq!(config.notifications.targets[0].channel, ChannelKind::Discord);
    assert!(!config.event_enabled("working"));
    assert!(config.event_enabled("audit_pass"));
}

#[test]
fn unknown_keys_are_collected_not_fatal() {
    let config: PluginConfig = toml::from_str("mystery_flag = true\n").unwrap();
    assert!(config.unknown.contains_key("mystery_flag"));
}

#[test]
fn unknown_channel_name_is_a_distinct_error() {
    let err = "slack".parse::<ChannelKind>().unwrap_err();
    assert!(err.to_string().contains("slack"));
}

#[test]
fn channel_kind_parses_known_names() {
    for (name, kind) in [
        ("desktop", ChannelKind::Desktop),
        ("discord", ChannelKind::Discord),
        ("telegram", ChannelKind::Telegram),
    ] {
        assert_eq!(name.parse::<ChannelKind>().unwrap(), kind);
        assert_eq!(kind.to_string(), name);
    }
}
