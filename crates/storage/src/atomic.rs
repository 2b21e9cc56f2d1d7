// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash-safe persistence for the store's JSON artifacts: stack
//! records, the stack index, secret maps, and agent registry snapshots.
//!
//! A write lands in a `<file>.pending` sibling first and only renames
//! over the target after fsync, so the target is always either the old
//! or the new artifact in full. An unreadable artifact is set aside as
//! `<file>.corrupt` (latest copy only, kept for post-mortems, never
//! read back) so a damaged stack record or registry snapshot degrades
//! to "absent" instead of wedging every later command.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Errors from persisting or loading a JSON artifact. Every variant
/// names the file involved.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl PersistError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub(crate) fn json(path: &Path, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Sibling path a write stages through before the rename.
fn pending_path(path: &Path) -> PathBuf {
    sibling(path, "pending")
}

/// Sibling path an unreadable artifact is set aside at.
fn corrupt_path(path: &Path) -> PathBuf {
    sibling(path, "corrupt")
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// Persist a JSON artifact atomically: stage, fsync, rename.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| PersistError::io(path, e))?;
    }

    // Pretty output: these artifacts get inspected by hand when a stack
    // misbehaves
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| PersistError::json(path, e))?;

    let staging = pending_path(path);
    let mut file = fs::File::create(&staging).map_err(|e| PersistError::io(&staging, e))?;
    file.write_all(&bytes)
        .and_then(|_| file.sync_all())
        .map_err(|e| PersistError::io(&staging, e))?;
    drop(file);

    fs::rename(&staging, path).map_err(|e| PersistError::io(path, e))
}

/// Load a JSON artifact, `what` naming it for diagnostics ("stack
/// record", "secret map", "agent registry", ...).
///
/// A missing file is `Ok(None)`. An unreadable file is set aside as
/// `<file>.corrupt` (replacing any earlier corrupt copy) and also
/// reported as `Ok(None)`, so callers recover by recreating the
/// artifact.
pub fn load_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<Option<T>, PersistError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(PersistError::io(path, e)),
    };

    match serde_json::from_slice(&bytes) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            let aside = corrupt_path(path);
            warn!(
                what,
                error = %e,
                path = %path.display(),
                aside = %aside.display(),
                "unreadable {what}, setting aside and treating as absent",
            );
            let _ = fs::remove_file(&aside);
            fs::rename(path, &aside).map_err(|e| PersistError::io(path, e))?;
            Ok(None)
        }
    }
}

#[cfg(test)]
#[path = "atomic_tests.rs"]
mod tests;
