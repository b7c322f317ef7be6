// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-dispatch artifacts under `<worktree>/.claw/`.
//!
//! Artifacts exist for humans and for the summary builder; the pipeline
//! never depends on them. Every operation here is best-effort: failures
//! are logged at warn and swallowed so a full disk or a deleted worktree
//! cannot take a dispatch down.

use claw_core::verdict::Verdict;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Name of the artifact directory inside a worktree.
pub const DISPATCH_DIR: &str = ".claw";

/// `manifest.json`: the at-a-glance status of the dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub status: String,
    pub attempts: u32,
    pub updated_at_ms: u64,
}

/// Writer for one worktree's artifact directory.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(worktree: &Path) -> Self {
        Self { dir: worktree.join(DISPATCH_DIR) }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Update `manifest.json`.
    pub fn update_manifest(&self, status: &str, attempts: u32, now_ms: u64) {
        let manifest = Manifest {
            status: status.to_string(),
            attempts,
            updated_at_ms: now_ms,
        };
        self.write_file("manifest.json", |json| {
            serde_json::to_string_pretty(&manifest).map(|s| {
                json.push_str(&s);
            })
        });
    }

    /// Persist raw worker output for one attempt.
    pub fn write_worker_output(&self, attempt: u32, output: &str) {
        self.write_file(&format!("worker-{attempt}.md"), |buf| {
            buf.push_str(output);
            Ok(())
        });
    }

    /// Persist the parsed verdict for one attempt.
    pub fn write_audit_verdict(&self, attempt: u32, verdict: &Verdict) {
        self.write_file(&format!("audit-{attempt}.json"), |buf| {
            serde_json::to_string_pretty(verdict).map(|s| {
                buf.push_str(&s);
            })
        });
    }

    /// Append one phase entry to `log.jsonl`.
    pub fn append_log(&self, phase: &str, attempt: u32, detail: &str, now_ms: u64) {
        let entry = json!({
            "ts": now_ms,
            "phase": phase,
            "attempt": attempt,
            "detail": detail,
        });
        if let Err(e) = self.append_line("log.jsonl", &entry.to_string()) {
            tracing::warn!(dir = %self.dir.display(), error = %e, "artifact log append failed");
        }
    }

    /// Write the derived `summary.md`.
    pub fn write_summary(&self, summary: &str) {
        self.write_file("summary.md", |buf| {
            buf.push_str(summary);
            Ok(())
        });
    }

    fn write_file(
        &self,
        name: &str,
        fill: impl FnOnce(&mut String) -> Result<(), serde_json::Error>,
    ) {
        let mut content = String::new();
        if let Err(e) = fill(&mut content) {
            tracing::warn!(artifact = name, error = %e, "artifact serialization failed");
            return;
        }
        if let Err(e) = std::fs::create_dir_all(&self.dir)
            .and_then(|_| std::fs::write(self.dir.join(name), content))
        {
            tracing::warn!(
                dir = %self.dir.display(),
                artifact = name,
                error = %e,
                "artifact write failed"
            );
        }
    }

    fn append_line(&self, name: &str, line: &str) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(name))?;
        writeln!(file, "{line}")
    }
}

/// Compose `summary.md` from the attempt artifacts in a worktree.
///
/// Best-effort like everything else here: returns the summary text when one
/// could be built so callers can reuse it (e.g. for orchestrator memory).
pub fn build_summary_from_artifacts(worktree: &Path) -> Option<String> {
    let writer = ArtifactWriter::new(worktree);
    let dir = writer.dir();

    let manifest: Option<Manifest> = std::fs::read_to_string(dir.join("manifest.json"))
        .ok()
        .and_then(|raw| serde_json::from_str(&raw).ok());

    let mut verdicts = Vec::new();
    for attempt in 0..=manifest.as_ref().map(|m| m.attempts).unwrap_or(0) {
        if let Ok(raw) = std::fs::read_to_string(dir.join(format!("audit-{attempt}.json"))) {
            if let Ok(verdict) = serde_json::from_str::<Verdict>(&raw) {
                verdicts.push((attempt, verdict));
            }
        }
    }

    if manifest.is_none() && verdicts.is_empty() {
        return None;
    }

    let mut out = String::new();
    if let Some(m) = &manifest {
        out.push_str(&format!(
            "# Dispatch summary\n\nStatus: {}\nAttempts: {}\n",
            m.status, m.attempts
        ));
    } else {
        out.push_str("# Dispatch summary\n");
    }
    for (attempt, verdict) in &verdicts {
        out.push_str(&format!(
            "\n## Attempt {}\n\nAudit: {}\n",
            attempt + 1,
            if verdict.pass { "passed" } else { "failed" }
        ));
        if !verdict.criteria.is_empty() {
            out.push_str("\nVerified:\n");
            for c in &verdict.criteria {
                out.push_str(&format!("- {c}\n"));
            }
        }
        if !verdict.gaps.is_empty() {
            out.push_str("\nGaps:\n");
            for g in &verdict.gaps {
                out.push_str(&format!("- {g}\n"));
            }
        }
        if !verdict.test_results.is_empty() {
            out.push_str(&format!("\nTests: {}\n", verdict.test_results));
        }
    }

    writer.write_summary(&out);
    Some(out)
}

#[cfg(test)]
#[path = "artifacts_tests.rs"]
mod tests;
