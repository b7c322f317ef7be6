// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    none = { None },
    empty = { Some("") },
    whitespace = { Some("  \n\t ") },
)]
fn blank_input_becomes_placeholder(input: Option<&str>) {
    assert_eq!(sanitize_prompt_input(input, MAX_PROMPT_INPUT_CHARS), "(no content)");
}

#[test]
fn double_braces_are_broken_apart() {
    let out = sanitize_prompt_input(Some("run {{inject}} now"), MAX_PROMPT_INPUT_CHARS);
    assert_eq!(out, "run { {inject} } now");
    assert!(!out.contains("{{"));
    assert!(!out.contains("}}"));
}

#[test]
fn quadruple_braces_leave_no_directive() {
    let out = sanitize_prompt_input(Some("{{{{x}}}}"), MAX_PROMPT_INPUT_CHARS);
    assert!(!out.contains("{{"));
    assert!(!out.contains("}}"));
}

#[test]
fn long_input_is_truncated_to_cap() {
    let input = "a".repeat(5000);
    let out = sanitize_prompt_input(Some(&input), MAX_PROMPT_INPUT_CHARS);
    assert_eq!(out.chars().count(), MAX_PROMPT_INPUT_CHARS);
}

#[test]
fn truncation_respects_char_boundaries() {
    let input = "é".repeat(10);
    let out = sanitize_prompt_input(Some(&input), 5);
    assert_eq!(out, "é".repeat(5));
}

#[test]
fn ordinary_text_passes_through() {
    let out = sanitize_prompt_input(Some("fix the flaky test"), MAX_PROMPT_INPUT_CHARS);
    assert_eq!(out, "fix the flaky test");
}
