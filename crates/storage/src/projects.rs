// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project dispatch store: the sibling document holding DAG plans.
//!
//! Same write discipline as the dispatch state store (lock, tmp + rename,
//! quarantine on corruption); the DAG controller does all graph reasoning
//! and uses this store only for load/modify/save.

use crate::doc::{self, DocError};
use crate::lock::{FileLock, LockError, DEFAULT_LOCK_TIMEOUT};
use claw_core::project::ProjectDispatch;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectStoreError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Doc(#[from] DocError),
}

/// The persisted project document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectState {
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectDispatch>,
}

/// Handle on the project dispatch state file.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    path: PathBuf,
    lock_timeout: Duration,
}

impl ProjectStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock_timeout: DEFAULT_LOCK_TIMEOUT }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<ProjectState, ProjectStoreError> {
        Ok(doc::read_json(&self.path)?.unwrap_or_default())
    }

    pub fn get(&self, project_id: &str) -> Result<Option<ProjectDispatch>, ProjectStoreError> {
        Ok(self.read()?.projects.get(project_id).cloned())
    }

    pub fn upsert(&self, project: ProjectDispatch) -> Result<(), ProjectStoreError> {
        self.mutate(|state| {
            state.projects.insert(project.project_id.clone(), project);
        })
    }

    pub fn remove(&self, project_id: &str) -> Result<bool, ProjectStoreError> {
        let mut removed = false;
        self.mutate(|state| {
            removed = state.projects.remove(project_id).is_some();
        })?;
        Ok(removed)
    }

    /// Locked read-modify-write over one project. Returns `Ok(None)` when
    /// the project does not exist (idempotent cascade calls hit this).
    pub fn update<T>(
        &self,
        project_id: &str,
        f: impl FnOnce(&mut ProjectDispatch) -> T,
    ) -> Result<Option<T>, ProjectStoreError> {
        let _lock = FileLock::acquire(&self.path, self.lock_timeout)?;
        let mut state = self.read()?;
        let Some(project) = state.projects.get_mut(project_id) else {
            return Ok(None);
        };
        let result = f(project);
        doc::write_json(&self.path, &state)?;
        Ok(Some(result))
    }

    fn mutate(&self, f: impl FnOnce(&mut ProjectState)) -> Result<(), ProjectStoreError> {
        let _lock = FileLock::acquire(&self.path, self.lock_timeout)?;
        let mut state = self.read()?;
        f(&mut state);
        doc::write_json(&self.path, &state)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "projects_tests.rs"]
mod tests;
