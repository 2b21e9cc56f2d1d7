// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State directory resolution.

use std::path::PathBuf;

/// Resolve the state root: `SLOTH_STATE_DIR` > `~/.sloth-runner`.
///
/// Returns `None` only when no home directory can be determined.
pub fn state_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("SLOTH_STATE_DIR") {
        if !dir.is_empty() {
            return Some(PathBuf::from(dir));
        }
    }
    dirs::home_dir().map(|home| home.join(".sloth-runner"))
}

/// Directory holding all stack directories.
pub fn stacks_dir(root: &std::path::Path) -> PathBuf {
    root.join("stacks")
}

/// Registry snapshot written by the master control server.
pub fn agents_file(root: &std::path::Path) -> PathBuf {
    root.join("agents.json")
}

/// SSH/agent profile definitions.
pub fn ssh_profiles_file(root: &std::path::Path) -> PathBuf {
    root.join("ssh_profiles.toml")
}
