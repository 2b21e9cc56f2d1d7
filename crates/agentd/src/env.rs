// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the agent daemon.

use std::path::PathBuf;

/// SLOTH_DEBUG=true enables verbose output.
pub fn debug_enabled() -> bool {
    std::env::var("SLOTH_DEBUG").is_ok_and(|v| v == "true" || v == "1")
}

/// Default tracing filter: SLOTH_LOG > debug flag > info.
pub fn log_filter() -> String {
    if let Ok(filter) = std::env::var("SLOTH_LOG") {
        if !filter.is_empty() {
            return filter;
        }
    }
    if debug_enabled() {
        "debug".to_string()
    } else {
        "info".to_string()
    }
}

/// Where the daemon writes its log file: `<state dir>/slothd.log`.
pub fn log_path() -> Option<PathBuf> {
    sloth_storage::state_dir().map(|dir| dir.join("slothd.log"))
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
