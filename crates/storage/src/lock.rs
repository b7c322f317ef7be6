// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exclusive file locks for state mutation.
//!
//! Lock granularity is one lock per state file path. The lock is advisory
//! (`fs2`), taken on a `.lock` sibling so quarantine renames of the state
//! file itself never race the lock holder.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

/// How long acquisition waits before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

const RETRY_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Error)]
pub enum LockError {
    /// Another holder kept the lock past the bound. Retryable.
    #[error("timed out waiting for lock on {path}")]
    Timeout { path: PathBuf },

    #[error("lock file error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Guard for an exclusive lock on one state file. Released on drop.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Acquire the lock for `state_path`, waiting up to `timeout`.
    ///
    /// Blocking acquisition with a bounded wait: `fs2` try-lock in a short
    /// retry loop rather than an unbounded blocking lock, so a wedged
    /// holder surfaces as [`LockError::Timeout`] instead of a hang.
    pub fn acquire(state_path: &Path, timeout: Duration) -> Result<Self, LockError> {
        let lock_path = lock_path_for(state_path);
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| LockError::Io {
                path: lock_path.clone(),
                source,
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)
            .map_err(|source| LockError::Io { path: lock_path.clone(), source })?;

        let deadline = Instant::now() + timeout;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    return Ok(Self { file, path: lock_path });
                }
                Err(_) if Instant::now() < deadline => {
                    std::thread::sleep(RETRY_INTERVAL);
                }
                Err(_) => {
                    return Err(LockError::Timeout { path: lock_path });
                }
            }
        }
    }

    /// Acquire with the default bound.
    pub fn acquire_default(state_path: &Path) -> Result<Self, LockError> {
        Self::acquire(state_path, DEFAULT_LOCK_TIMEOUT)
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release file lock");
        }
    }
}

fn lock_path_for(state_path: &Path) -> PathBuf {
    let mut name = state_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    name.push_str(".lock");
    state_path.with_file_name(name)
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
