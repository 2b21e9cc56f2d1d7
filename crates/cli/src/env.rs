// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the CLI.

use std::path::PathBuf;

use crate::exit::ExitError;

/// SLOTH_DEBUG=true enables verbose event emission.
pub fn debug_enabled() -> bool {
    std::env::var("SLOTH_DEBUG").is_ok_and(|v| v == "true" || v == "1")
}

/// Default tracing filter: SLOTH_LOG > debug flag > warn.
///
/// The CLI keeps stderr quiet by default; run progress goes through the
/// event sinks, not the log.
pub fn log_filter() -> String {
    if let Ok(filter) = std::env::var("SLOTH_LOG") {
        if !filter.is_empty() {
            return filter;
        }
    }
    if debug_enabled() {
        "debug".to_string()
    } else {
        "warn".to_string()
    }
}

/// Resolve the state root, failing cleanly when no home is available.
pub fn state_dir() -> Result<PathBuf, ExitError> {
    sloth_storage::state_dir()
        .ok_or_else(|| ExitError::failure("cannot determine home directory for state"))
}
