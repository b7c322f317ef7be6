// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session keys for correlating sub-agent runs with their dispatch.
//!
//! Every worker or audit run gets a fresh key at spawn time. End-of-agent
//! signals carry the key back so the pipeline can locate the owning
//! dispatch through the session map.

use serde::{Deserialize, Serialize};

/// Opaque identifier for one sub-agent run.
///
/// Format: `ses-` followed by a 19-character nanoid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    pub const PREFIX: &'static str = "ses-";

    /// Generate a fresh random key.
    pub fn generate() -> Self {
        Self(format!("{}{}", Self::PREFIX, nanoid::nanoid!(19)))
    }

    /// Wrap an existing key string (for parsing/deserialization).
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key suffix without the type prefix, truncated for log lines.
    pub fn short(&self) -> &str {
        let suffix = self.0.strip_prefix(Self::PREFIX).unwrap_or(&self.0);
        &suffix[..suffix.len().min(8)]
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionKey {
    fn from(s: &str) -> Self {
        Self::from_string(s)
    }
}

impl std::borrow::Borrow<str> for SessionKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
