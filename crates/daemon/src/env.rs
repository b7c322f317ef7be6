// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;

/// Resolve config directory: CLAW_CONFIG_DIR > XDG config dir > ~/.config/claw
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("CLAW_CONFIG_DIR") {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join("claw"))
}

/// Webhook listen address, default loopback on 8787.
pub fn listen_addr() -> String {
    std::env::var("CLAW_LISTEN").unwrap_or_else(|_| "127.0.0.1:8787".to_string())
}

/// Log filter directive (`CLAW_LOG`), default `info`.
pub fn log_filter() -> String {
    std::env::var("CLAW_LOG").unwrap_or_else(|_| "info".to_string())
}
