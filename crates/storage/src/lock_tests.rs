// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

#[test]
fn acquire_creates_lock_sibling() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("state.json");
    let _guard = FileLock::acquire(&state, Duration::from_secs(1)).unwrap();
    assert!(dir.path().join("state.json.lock").exists());
}

#[test]
fn lock_is_exclusive_until_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("state.json");

    let guard = FileLock::acquire(&state, Duration::from_secs(1)).unwrap();
    // fs2 locks are per-file-handle, so contention needs a second handle;
    // a second acquire in the same process uses its own File.
    let contender = FileLock::acquire(&state, Duration::from_millis(100));
    assert!(matches!(contender, Err(LockError::Timeout { .. })));

    drop(guard);
    FileLock::acquire(&state, Duration::from_secs(1)).unwrap();
}

#[test]
fn release_happens_even_on_panic() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("state.json");
    let state_clone = state.clone();

    let result = std::panic::catch_unwind(move || {
        let _guard = FileLock::acquire(&state_clone, Duration::from_secs(1)).unwrap();
        panic!("handler died mid-mutation");
    });
    assert!(result.is_err());

    // Guard dropped during unwind; the lock must be free again.
    FileLock::acquire(&state, Duration::from_millis(200)).unwrap();
}

#[test]
fn missing_parent_directory_is_created() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("nested/deeper/state.json");
    FileLock::acquire(&state, Duration::from_secs(1)).unwrap();
    assert!(state.parent().unwrap().exists());
}
