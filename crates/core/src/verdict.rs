// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Audit verdict type and tolerant extraction from raw agent output.
//!
//! Auditors are asked to end their output with a JSON object of the shape
//! `{"pass": bool, "criteria": [...], "gaps": [...], "testResults": "..."}`
//! but routinely wrap it in prose or code fences. The parser scans the
//! whole output for balanced JSON object fragments and keeps the last one
//! that decodes to a verdict.

use serde::{Deserialize, Serialize};

/// Structured audit outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub pass: bool,
    #[serde(default)]
    pub criteria: Vec<String>,
    #[serde(default)]
    pub gaps: Vec<String>,
    #[serde(default, rename = "testResults", skip_serializing_if = "String::is_empty")]
    pub test_results: String,
}

impl Verdict {
    /// Synthetic failing verdict used when audit output cannot be parsed.
    pub fn inconclusive(reason: impl Into<String>) -> Self {
        Self {
            pass: false,
            criteria: Vec::new(),
            gaps: vec![reason.into()],
            test_results: String::new(),
        }
    }
}

/// Result of scanning audit output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerdictOutcome {
    Parsed(Verdict),
    /// No JSON fragment in the output decoded to a verdict.
    Unparseable,
}

impl VerdictOutcome {
    pub fn into_verdict(self) -> Option<Verdict> {
        match self {
            VerdictOutcome::Parsed(v) => Some(v),
            VerdictOutcome::Unparseable => None,
        }
    }
}

/// Scan `output` for JSON object fragments and return the last one that
/// decodes to a [`Verdict`].
///
/// Fragments are located by brace matching (string-aware, so braces inside
/// JSON strings do not confuse the scan). Objects without a boolean `pass`
/// field are skipped.
pub fn parse_verdict(output: &str) -> VerdictOutcome {
    let mut last = None;
    for fragment in JsonFragments::new(output) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(fragment) {
            if value.get("pass").map(|p| p.is_boolean()).unwrap_or(false) {
                if let Ok(verdict) = serde_json::from_value::<Verdict>(value) {
                    last = Some(verdict);
                }
            }
        }
    }
    match last {
        Some(v) => VerdictOutcome::Parsed(v),
        None => VerdictOutcome::Unparseable,
    }
}

/// Iterator over balanced top-level `{...}` fragments of a string.
struct JsonFragments<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> JsonFragments<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }
}

impl<'a> Iterator for JsonFragments<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let bytes = self.text.as_bytes();
        while self.pos < bytes.len() {
            if bytes[self.pos] != b'{' {
                self.pos += 1;
                continue;
            }
            let start = self.pos;
            let mut depth = 0usize;
            let mut in_string = false;
            let mut escaped = false;
            let mut i = start;
            while i < bytes.len() {
                let b = bytes[i];
                if in_string {
                    if escaped {
                        escaped = false;
                    } else if b == b'\\' {
                        escaped = true;
                    } else if b == b'"' {
                        in_string = false;
                    }
                } else {
                    match b {
                        b'"' => in_string = true,
                        b'{' => depth += 1,
                        b'}' => {
                            depth -= 1;
                            if depth == 0 {
                                // Resume just past the opening brace so
                                // objects nested inside are scanned too.
                                self.pos = start + 1;
                                return Some(&self.text[start..=i]);
                            }
                        }
                        _ => {}
                    }
                }
                i += 1;
            }
            // Unbalanced fragment: skip the opening brace and rescan so a
            // later complete object is still found.
            self.pos = start + 1;
        }
        None
    }
}

#[cfg(test)]
#[path = "verdict_tests.rs"]
mod tests;
