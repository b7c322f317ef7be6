// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON document I/O shared by the state stores.
//!
//! Documents are read whole, written to `<path>.tmp`, and renamed into
//! place. A document that fails to parse is quarantined (renamed with a
//! `.corrupted.<ts>` suffix) and treated as absent; history is preserved
//! on disk for a human to inspect while the daemon starts fresh.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocError {
    #[error("read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialize {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Read a JSON document, quarantining a corrupt file.
///
/// Returns `Ok(None)` when the file does not exist or was quarantined.
/// Quarantine is logged at warn, never an error: a corrupt state file must
/// not take the daemon down.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, DocError> {
    read_json_value(path)?
        .map(|value| serde_json::from_value(value))
        .transpose()
        .map_err(|source| {
            // Shape mismatch after a successful parse is corruption too.
            DocError::Serialize { path: path.to_path_buf(), source }
        })
}

/// Read a JSON document as a raw value (for callers that migrate shapes
/// before decoding). `Ok(None)` when absent or quarantined.
pub fn read_json_value(path: &Path) -> Result<Option<serde_json::Value>, DocError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(DocError::Read { path: path.to_path_buf(), source }),
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(parse_err) => {
            quarantine(path, &parse_err);
            Ok(None)
        }
    }
}

/// Write a JSON document atomically: serialize, write `<path>.tmp`, rename.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), DocError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|source| DocError::Serialize { path: path.to_path_buf(), source })?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|source| DocError::Write { path: path.to_path_buf(), source })?;
    }

    let tmp = tmp_path(path);
    std::fs::write(&tmp, json)
        .map_err(|source| DocError::Write { path: tmp.clone(), source })?;
    std::fs::rename(&tmp, path)
        .map_err(|source| DocError::Write { path: path.to_path_buf(), source })
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "doc".to_string());
    name.push_str(".tmp");
    path.with_file_name(name)
}

pub(crate) fn quarantine(path: &Path, cause: &dyn std::fmt::Display) {
    let ts = chrono::Utc::now().format("%Y%m%dT%H%M%S%3f");
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "doc".to_string());
    name.push_str(&format!(".corrupted.{ts}"));
    let target = path.with_file_name(name);
    match std::fs::rename(path, &target) {
        Ok(()) => {
            tracing::warn!(
                path = %path.display(),
                quarantined = %target.display(),
                error = %cause,
                "state file corrupt; quarantined and starting fresh"
            );
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "state file corrupt and quarantine rename failed"
            );
        }
    }
}

#[cfg(test)]
#[path = "doc_tests.rs"]
mod tests;
