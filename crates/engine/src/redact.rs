// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Redaction for error text leaving the process.
//!
//! Notification targets are addressed by webhook URLs and authenticated
//! with tokens; when a send fails, the transport error often echoes both.
//! Everything logged about a failed delivery passes through [`redact`].

use regex::Regex;
use std::sync::LazyLock;

// Constant patterns, verified valid at compile time.
#[allow(clippy::expect_used)]
static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("constant regex pattern is valid"));

#[allow(clippy::expect_used)]
static BEARER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(bearer|token|authorization)[:=\s]+\S+")
        .expect("constant regex pattern is valid")
});

/// Long alphanumeric runs look like credentials whether or not they are.
#[allow(clippy::expect_used)]
static TOKEN_RUN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9_-]{20,}").expect("constant regex pattern is valid"));

/// Strip URLs and token-like substrings from error text.
pub fn redact(text: &str) -> String {
    let text = URL_PATTERN.replace_all(text, "[url]");
    let text = BEARER_PATTERN.replace_all(&text, "[credential]");
    TOKEN_RUN_PATTERN.replace_all(&text, "[redacted]").into_owned()
}

#[cfg(test)]
#[path = "redact_tests.rs"]
mod tests;
