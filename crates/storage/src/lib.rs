// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! claw-storage: file-backed dispatch state with locked, atomic writes.
//!
//! Every state document lives as a single JSON file written via
//! `tmp + rename` under an advisory file lock, so concurrent handlers in
//! one process and sibling processes on the same host serialize cleanly.

pub mod artifacts;
pub mod doc;
pub mod lock;
pub mod projects;
pub mod state;

pub use artifacts::{ArtifactWriter, Manifest, DISPATCH_DIR};
pub use doc::DocError;
pub use lock::{FileLock, LockError};
pub use projects::ProjectStore;
pub use state::{DispatchState, StateError, StateStore, TransitionError, PROCESSED_EVENTS_CAP};
