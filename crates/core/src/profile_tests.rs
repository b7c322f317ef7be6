// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn profiles() -> AgentProfiles {
    AgentProfiles::new(vec![
        AgentProfile {
            id: "claude".to_string(),
            alias: "claw".to_string(),
            label: "Claw".to_string(),
            avatar_url: None,
        },
        AgentProfile {
            id: "codex".to_string(),
            alias: "codex".to_string(),
            label: "Codex".to_string(),
            avatar_url: None,
        },
    ])
}

#[test]
fn mention_routes_to_profile() {
    let p = profiles();
    assert_eq!(p.mentioned_in("hey @claw please fix this").unwrap().id, "claude");
    assert_eq!(p.mentioned_in("@codex take a look").unwrap().id, "codex");
}

#[test]
fn mention_is_case_insensitive() {
    let p = profiles();
    assert_eq!(p.mentioned_in("Hey @CLAW!").unwrap().id, "claude");
}

#[test]
fn partial_word_is_not_a_mention() {
    let p = profiles();
    assert!(p.mentioned_in("email me at x@clawful.dev").is_none());
}

#[test]
fn mention_followed_by_punctuation_matches() {
    let p = profiles();
    assert!(p.mentioned_in("@claw: see above").is_some());
    assert!(p.mentioned_in("done, thanks @claw.").is_some());
}

#[test]
fn no_mention_returns_none() {
    let p = profiles();
    assert!(p.mentioned_in("just an ordinary comment").is_none());
}

#[test]
fn by_id_lookup() {
    let p = profiles();
    assert_eq!(p.by_id("codex").unwrap().alias, "codex");
    assert!(p.by_id("gemini").is_none());
}

#[test]
fn profiles_deserialize_from_bare_array() {
    let json = r#"[{"id": "claude", "alias": "claw", "label": "Claw"}]"#;
    let p: AgentProfiles = serde_json::from_str(json).unwrap();
    assert!(!p.is_empty());
    assert_eq!(p.alias_index()["claw"], "claude");
}
