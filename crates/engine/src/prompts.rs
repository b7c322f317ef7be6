// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Layered prompt templates for the worker and audit phases.
//!
//! Resolution order: hardcoded defaults ⟵ global overrides (the configured
//! prompts directory) ⟵ per-worktree overrides (`.claw/prompts/`). The
//! merged set is cached per worktree.

use crate::template::interpolate;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const WORKER_TEMPLATE_FILE: &str = "worker.md";
const AUDIT_TEMPLATE_FILE: &str = "audit.md";

pub const DEFAULT_WORKER_PROMPT: &str = "\
You are implementing a change for issue ${identifier}: ${title}

${description}

Work in ${worktree_path}. This is attempt ${attempt}.
${gaps_section}${project_context}${team_context}${guidance}
Commit your work when done and end with a short summary of what changed.";

pub const DEFAULT_AUDIT_PROMPT: &str = "\
You are auditing an implementation for issue ${identifier}: ${title}

${description}

Review the work in ${worktree_path} (attempt ${attempt}). Check that the
change addresses the issue, builds, and is tested. End your output with a
single JSON object: {\"pass\": bool, \"criteria\": [..], \"gaps\": [..], \
\"testResults\": \"..\"}";

/// The merged templates for one worktree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    pub worker: String,
    pub audit: String,
}

impl PromptSet {
    pub fn render_worker(&self, vars: &HashMap<String, String>) -> String {
        interpolate(&self.worker, vars)
    }

    pub fn render_audit(&self, vars: &HashMap<String, String>) -> String {
        interpolate(&self.audit, vars)
    }
}

/// Template resolver with a per-worktree cache.
pub struct PromptLayers {
    global_dir: Option<PathBuf>,
    cache: Mutex<HashMap<PathBuf, PromptSet>>,
}

impl PromptLayers {
    pub fn new(global_dir: Option<PathBuf>) -> Self {
        Self { global_dir, cache: Mutex::new(HashMap::new()) }
    }

    /// Merge the layers for `worktree`, caching the result.
    pub fn for_worktree(&self, worktree: &Path) -> PromptSet {
        if let Some(cached) = self.cache.lock().get(worktree) {
            return cached.clone();
        }

        let worktree_dir = worktree.join(".claw").join("prompts");
        let set = PromptSet {
            worker: resolve_layer(
                DEFAULT_WORKER_PROMPT,
                self.global_dir.as_deref(),
                &worktree_dir,
                WORKER_TEMPLATE_FILE,
            ),
            audit: resolve_layer(
                DEFAULT_AUDIT_PROMPT,
                self.global_dir.as_deref(),
                &worktree_dir,
                AUDIT_TEMPLATE_FILE,
            ),
        };
        self.cache.lock().insert(worktree.to_path_buf(), set.clone());
        set
    }

    /// Drop all cached merges (test hook and template-edit support).
    pub fn reset_cache(&self) {
        self.cache.lock().clear();
    }
}

fn resolve_layer(
    default: &str,
    global_dir: Option<&Path>,
    worktree_dir: &Path,
    file: &str,
) -> String {
    let mut template = default.to_string();
    if let Some(dir) = global_dir {
        if let Some(overridden) = read_template(&dir.join(file)) {
            template = overridden;
        }
    }
    if let Some(overridden) = read_template(&worktree_dir.join(file)) {
        template = overridden;
    }
    template
}

fn read_template(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(content) if !content.trim().is_empty() => Some(content),
        Ok(_) => None,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "prompt template unreadable");
            None
        }
    }
}

#[cfg(test)]
#[path = "prompts_tests.rs"]
mod tests;
