// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured idempotency keys for webhook and pipeline events.
//!
//! Keys are plain strings so they can live in the persisted
//! `processed_events` FIFO; the constructors here are the single place
//! their shapes are defined.

use crate::session::SessionKey;

pub fn session(id: &str) -> String {
    format!("session:{id}")
}

pub fn comment(id: &str) -> String {
    format!("comment:{id}")
}

pub fn webhook(id: &str) -> String {
    format!("webhook:{id}")
}

pub fn issue_create(id: &str) -> String {
    format!("issue-create:{id}")
}

pub fn worker_end(key: &SessionKey) -> String {
    format!("worker-end:{key}")
}

pub fn audit_end(key: &SessionKey) -> String {
    format!("audit-end:{key}")
}

/// Key for assignment/delegation triggers, scoped to issue and viewer so
/// re-assignment to a different identity is not suppressed.
pub fn trigger(kind: &str, issue_id: &str, viewer_id: &str) -> String {
    format!("{kind}:{issue_id}:{viewer_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_and_deterministic() {
        assert_eq!(session("sess-X"), "session:sess-X");
        assert_eq!(comment("c1"), "comment:c1");
        assert_eq!(webhook("w1"), "webhook:w1");
        assert_eq!(issue_create("i1"), "issue-create:i1");
        assert_eq!(trigger("assigned", "i1", "v1"), "assigned:i1:v1");

        let key = SessionKey::from_string("ses-abc");
        assert_eq!(worker_end(&key), "worker-end:ses-abc");
        assert_eq!(audit_end(&key), "audit-end:ses-abc");
    }
}
