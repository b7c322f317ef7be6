// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sanitization of free text before prompt interpolation.
//!
//! Comment bodies and issue descriptions come from the tracker and end up
//! inside agent prompts. Double-brace sequences are broken apart so user
//! text cannot smuggle template directives into the rendered prompt.

/// Default cap applied to interpolated free text.
pub const MAX_PROMPT_INPUT_CHARS: usize = 4000;

/// Prepare untrusted free text for prompt interpolation.
///
/// - `None` or blank input becomes `"(no content)"`
/// - `{{` and `}}` are escaped to `{ {` and `} }`
/// - output is truncated to `max_chars` (on a char boundary)
pub fn sanitize_prompt_input(input: Option<&str>, max_chars: usize) -> String {
    let text = match input {
        Some(t) if !t.trim().is_empty() => t,
        _ => return "(no content)".to_string(),
    };

    // A single replace pass can recombine braces (`{{{{` → `{ {{ {`), so
    // repeat until no directive-forming pair survives.
    let mut escaped = text.to_string();
    while escaped.contains("{{") {
        escaped = escaped.replace("{{", "{ {");
    }
    while escaped.contains("}}") {
        escaped = escaped.replace("}}", "} }");
    }
    if escaped.chars().count() <= max_chars {
        return escaped;
    }
    escaped.chars().take(max_chars).collect()
}

#[cfg(test)]
#[path = "sanitize_tests.rs"]
mod tests;
