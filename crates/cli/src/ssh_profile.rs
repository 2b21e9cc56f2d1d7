// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SSH/agent profiles: named remote targets configured outside the
//! workflow, at `~/.sloth-runner/ssh_profiles.toml`:
//!
//! ```toml
//! [profiles.staging]
//! address = "10.0.0.5:7331"
//! ```
//!
//! A profile behaves as a static agent: `--ssh-profile staging` makes
//! `staging` resolvable and the default delegation target for groups
//! that declare none.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid ssh_profiles.toml: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("unknown ssh profile '{0}'")]
    Unknown(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct SshProfile {
    /// Command-plane address of the remote agent
    pub address: String,
}

#[derive(Debug, Default, Deserialize)]
struct ProfilesFile {
    #[serde(default)]
    profiles: HashMap<String, SshProfile>,
}

/// Load one named profile from the profiles file.
pub fn load_profile(path: &Path, name: &str) -> Result<SshProfile, ProfileError> {
    if !path.exists() {
        return Err(ProfileError::Unknown(name.to_string()));
    }
    let content = std::fs::read_to_string(path).map_err(|source| ProfileError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let file: ProfilesFile = toml::from_str(&content)?;
    file.profiles
        .get(name)
        .cloned()
        .ok_or_else(|| ProfileError::Unknown(name.to_string()))
}

#[cfg(test)]
#[path = "ssh_profile_tests.rs"]
mod tests;
