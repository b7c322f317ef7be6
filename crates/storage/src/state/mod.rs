// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The dispatch state store: one versioned JSON document with CAS
//! transitions.
//!
//! Every mutator acquires the file lock, reads (migrating legacy shapes),
//! mutates in memory, writes `<path>.tmp`, renames, releases. CAS failures
//! are not faults: they tell the caller another handler already advanced
//! the dispatch.

mod migration;

pub use migration::STATE_VERSION;

use crate::doc::{self, DocError};
use crate::lock::{FileLock, LockError, DEFAULT_LOCK_TIMEOUT};
use claw_core::dispatch::{
    ActiveDispatch, CompletedDispatch, DispatchStatus, SessionMapping,
};
use claw_core::session::SessionKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Upper bound on the persisted idempotency FIFO.
pub const PROCESSED_EVENTS_CAP: usize = 200;

/// Active and completed dispatch maps, keyed by issue identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchMaps {
    #[serde(default)]
    pub active: BTreeMap<String, ActiveDispatch>,
    #[serde(default)]
    pub completed: BTreeMap<String, CompletedDispatch>,
}

/// The persisted state document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchState {
    pub version: u32,
    #[serde(default)]
    pub dispatches: DispatchMaps,
    /// Session key → owning dispatch.
    #[serde(default)]
    pub session_map: BTreeMap<String, SessionMapping>,
    /// Bounded FIFO of consumed event keys, oldest first.
    #[serde(default)]
    pub processed_events: Vec<String>,
}

impl Default for DispatchState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            dispatches: DispatchMaps::default(),
            session_map: BTreeMap::new(),
            processed_events: Vec::new(),
        }
    }
}

/// CAS rejection. `StaleState` is normal control flow: someone else already
/// advanced the dispatch, and the caller should stand down.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("dispatch {id} not found")]
    Missing { id: String },

    #[error("dispatch {id} is {actual}, expected {expected}")]
    StaleState {
        id: String,
        expected: DispatchStatus,
        actual: DispatchStatus,
    },

    #[error("transition {from} -> {to} is not allowed")]
    InvalidTransition {
        from: DispatchStatus,
        to: DispatchStatus,
    },
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Doc(#[from] DocError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// State file written by a newer daemon. Refusing to guess.
    #[error("state file {path} has unsupported version {found} (current {current})")]
    UnsupportedVersion {
        path: PathBuf,
        found: u64,
        current: u32,
    },

    #[error("dispatch {id} is already active")]
    AlreadyActive { id: String },
}

/// Optional field updates applied in the same write as a transition.
#[derive(Debug, Clone, Default)]
pub struct TransitionUpdates {
    pub attempt: Option<u32>,
    pub worker_session_key: Option<SessionKey>,
    pub audit_session_key: Option<SessionKey>,
    pub stuck_reason: Option<String>,
}

impl TransitionUpdates {
    pub fn stuck(reason: impl Into<String>) -> Self {
        Self { stuck_reason: Some(reason.into()), ..Self::default() }
    }

    pub fn attempt(attempt: u32) -> Self {
        Self { attempt: Some(attempt), ..Self::default() }
    }
}

/// Handle on the dispatch state file.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
    lock_timeout: Duration,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock_timeout: DEFAULT_LOCK_TIMEOUT }
    }

    pub fn with_lock_timeout(path: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        Self { path: path.into(), lock_timeout }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the current state, migrating legacy schemas.
    ///
    /// A corrupt document is quarantined and an empty state returned; a
    /// document from a *newer* schema version fails loudly instead.
    pub fn read(&self) -> Result<DispatchState, StateError> {
        let Some(raw) = doc::read_json_value(&self.path)? else {
            return Ok(DispatchState::default());
        };

        let found = raw.get("version").and_then(|v| v.as_u64()).unwrap_or(1);
        if found > STATE_VERSION as u64 {
            return Err(StateError::UnsupportedVersion {
                path: self.path.clone(),
                found,
                current: STATE_VERSION,
            });
        }

        let migrated = migration::migrate(raw);
        match serde_json::from_value::<DispatchState>(migrated) {
            Ok(state) => Ok(state),
            Err(e) => {
                // Parsed as JSON but not as our shape: corruption, same
                // quarantine path as unparseable bytes.
                doc::quarantine(&self.path, &e);
                Ok(DispatchState::default())
            }
        }
    }

    /// Locked read-modify-write cycle shared by all mutators.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut DispatchState) -> Result<T, StateError>,
    ) -> Result<T, StateError> {
        let _lock = FileLock::acquire(&self.path, self.lock_timeout)?;
        let mut state = self.read()?;
        let result = f(&mut state)?;
        if state.processed_events.len() > PROCESSED_EVENTS_CAP {
            let overflow = state.processed_events.len() - PROCESSED_EVENTS_CAP;
            state.processed_events.drain(..overflow);
        }
        state.version = STATE_VERSION;
        doc::write_json(&self.path, &state)?;
        Ok(result)
    }

    /// Register a new active dispatch.
    ///
    /// Any completed record for the same identifier is dropped so one
    /// identifier never appears in both maps.
    pub fn register_dispatch(&self, dispatch: ActiveDispatch) -> Result<(), StateError> {
        self.mutate(|state| {
            let id = dispatch.issue_identifier.clone();
            if state.dispatches.active.contains_key(&id) {
                return Err(StateError::AlreadyActive { id });
            }
            state.dispatches.completed.remove(&id);
            state.dispatches.active.insert(id, dispatch);
            Ok(())
        })
    }

    /// Atomic compare-and-swap status transition with optional updates.
    pub fn transition(
        &self,
        id: &str,
        from: DispatchStatus,
        to: DispatchStatus,
        updates: TransitionUpdates,
    ) -> Result<ActiveDispatch, StateError> {
        self.mutate(|state| {
            let dispatch = state
                .dispatches
                .active
                .get_mut(id)
                .ok_or_else(|| TransitionError::Missing { id: id.to_string() })?;

            if dispatch.status != from {
                return Err(TransitionError::StaleState {
                    id: id.to_string(),
                    expected: from,
                    actual: dispatch.status,
                }
                .into());
            }
            if !from.can_transition_to(to) {
                return Err(TransitionError::InvalidTransition { from, to }.into());
            }

            dispatch.status = to;
            if let Some(attempt) = updates.attempt {
                dispatch.attempt = attempt;
            }
            if let Some(key) = updates.worker_session_key {
                dispatch.worker_session_key = Some(key);
            }
            if let Some(key) = updates.audit_session_key {
                dispatch.audit_session_key = Some(key);
            }
            dispatch.stuck_reason = if to == DispatchStatus::Stuck {
                updates.stuck_reason
            } else {
                None
            };

            Ok(dispatch.clone())
        })
    }

    /// Move a dispatch from active to completed, purging its session map
    /// entries in the same write.
    pub fn complete_dispatch(
        &self,
        id: &str,
        record: CompletedDispatch,
    ) -> Result<(), StateError> {
        self.mutate(|state| {
            state.dispatches.active.remove(id);
            state.session_map.retain(|_, m| m.dispatch_id != id);
            state
                .dispatches
                .completed
                .insert(record.issue_identifier.clone(), record);
            Ok(())
        })
    }

    /// Drop an active dispatch without recording completion (admin/reclaim).
    pub fn remove_active_dispatch(&self, id: &str) -> Result<bool, StateError> {
        self.mutate(|state| {
            state.session_map.retain(|_, m| m.dispatch_id != id);
            Ok(state.dispatches.active.remove(id).is_some())
        })
    }

    /// Record the worker session key on an already-working dispatch
    /// (rework runs generate a fresh key after the attempt bump).
    pub fn record_worker_session(&self, id: &str, key: &SessionKey) -> Result<(), StateError> {
        self.mutate(|state| {
            let dispatch = state
                .dispatches
                .active
                .get_mut(id)
                .ok_or_else(|| TransitionError::Missing { id: id.to_string() })?;
            dispatch.worker_session_key = Some(key.clone());
            Ok(())
        })
    }

    /// Record the audit session key on a dispatch.
    pub fn record_audit_session(&self, id: &str, key: &SessionKey) -> Result<(), StateError> {
        self.mutate(|state| {
            let dispatch = state
                .dispatches
                .active
                .get_mut(id)
                .ok_or_else(|| TransitionError::Missing { id: id.to_string() })?;
            dispatch.audit_session_key = Some(key.clone());
            Ok(())
        })
    }

    pub fn register_session_mapping(
        &self,
        key: &SessionKey,
        mapping: SessionMapping,
    ) -> Result<(), StateError> {
        self.mutate(|state| {
            state.session_map.insert(key.as_str().to_string(), mapping);
            Ok(())
        })
    }

    pub fn remove_session_mapping(&self, key: &SessionKey) -> Result<(), StateError> {
        self.mutate(|state| {
            state.session_map.remove(key.as_str());
            Ok(())
        })
    }

    pub fn session_mapping(&self, key: &SessionKey) -> Result<Option<SessionMapping>, StateError> {
        Ok(self.read()?.session_map.get(key.as_str()).cloned())
    }

    /// Record an event key for idempotency.
    ///
    /// Returns `true` if the key was new (and is now persisted), `false`
    /// for a duplicate. FIFO eviction keeps the set bounded.
    pub fn mark_event_processed(&self, key: &str) -> Result<bool, StateError> {
        self.mutate(|state| {
            if state.processed_events.iter().any(|k| k == key) {
                return Ok(false);
            }
            state.processed_events.push(key.to_string());
            Ok(true)
        })
    }

    /// Pre-register an event key we expect to be echoed back (e.g. the id
    /// of a comment we just posted). Duplicate registration is fine.
    pub fn pre_register_event(&self, key: &str) -> Result<(), StateError> {
        self.mark_event_processed(key).map(|_| ())
    }

    /// Drop completed entries older than `max_age_ms`. Returns the count
    /// removed.
    pub fn prune_completed(&self, max_age_ms: u64, now_ms: u64) -> Result<usize, StateError> {
        self.mutate(|state| {
            let cutoff = now_ms.saturating_sub(max_age_ms);
            let before = state.dispatches.completed.len();
            state
                .dispatches
                .completed
                .retain(|_, c| c.completed_at >= cutoff);
            Ok(before - state.dispatches.completed.len())
        })
    }

    pub fn list_active_dispatches(&self) -> Result<Vec<ActiveDispatch>, StateError> {
        Ok(self.read()?.dispatches.active.into_values().collect())
    }

    pub fn get_active(&self, id: &str) -> Result<Option<ActiveDispatch>, StateError> {
        Ok(self.read()?.dispatches.active.get(id).cloned())
    }

    /// Active dispatches whose `dispatched_at` is older than `max_age_ms`.
    pub fn list_stale_dispatches(
        &self,
        max_age_ms: u64,
        now_ms: u64,
    ) -> Result<Vec<ActiveDispatch>, StateError> {
        let cutoff = now_ms.saturating_sub(max_age_ms);
        Ok(self
            .read()?
            .dispatches
            .active
            .into_values()
            .filter(|d| d.dispatched_at < cutoff)
            .collect())
    }

    /// Dispatches whose worker finished but whose audit never started:
    /// `working` with a worker session key and no audit session key. After
    /// a crash these are resumed by re-triggering the audit.
    pub fn list_recoverable_dispatches(&self) -> Result<Vec<ActiveDispatch>, StateError> {
        Ok(self
            .read()?
            .dispatches
            .active
            .into_values()
            .filter(|d| {
                d.status == DispatchStatus::Working
                    && d.worker_session_key.is_some()
                    && d.audit_session_key.is_none()
            })
            .collect())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
