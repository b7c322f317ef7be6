// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Legacy state schema migration.
//!
//! v1 (the original flat layout) kept `active`, `completed`, `sessions`,
//! and `events` at the top level. v2 nests the dispatch maps under
//! `dispatches` and renames the session and event collections. Migration
//! runs inside `StateStore::read` so callers never observe a legacy shape.

use serde_json::{json, Value};

/// Current schema version written by this build.
pub const STATE_VERSION: u32 = 2;

/// Bring a raw state document up to [`STATE_VERSION`].
///
/// Idempotent and monotone: migrating an already-current document returns
/// it unchanged (apart from a missing `version` being stamped).
pub fn migrate(mut value: Value) -> Value {
    let version = value.get("version").and_then(|v| v.as_u64()).unwrap_or(1);
    if version < 2 {
        value = v1_to_v2(value);
    }
    if let Some(obj) = value.as_object_mut() {
        obj.insert("version".to_string(), json!(STATE_VERSION));
    }
    value
}

/// v1 → v2: nest `active`/`completed` under `dispatches`, rename
/// `sessions` → `session_map` and `events` → `processed_events`.
fn v1_to_v2(mut value: Value) -> Value {
    let Some(obj) = value.as_object_mut() else {
        return value;
    };

    let active = obj.remove("active").unwrap_or_else(|| json!({}));
    let completed = obj.remove("completed").unwrap_or_else(|| json!({}));
    if !obj.contains_key("dispatches") {
        obj.insert(
            "dispatches".to_string(),
            json!({ "active": active, "completed": completed }),
        );
    }

    if let Some(sessions) = obj.remove("sessions") {
        obj.entry("session_map").or_insert(sessions);
    }
    if let Some(events) = obj.remove("events") {
        obj.entry("processed_events").or_insert(events);
    }

    value
}

#[cfg(test)]
#[path = "migration_tests.rs"]
mod tests;
