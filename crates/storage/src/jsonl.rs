// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only JSONL logs with fsync-per-record durability.
//!
//! Each record is one line of JSON. An append is durable once the fsync
//! returns; a crash mid-append leaves at most one torn final line, which
//! readers silently discard. A record is therefore observed fully or not
//! at all.

use crate::atomic::PersistError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use tracing::warn;

/// Append one record as a JSON line and fsync.
pub fn append<T: Serialize>(path: &Path, record: &T) -> Result<(), PersistError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| PersistError::io(path, e))?;
    }

    let mut line = serde_json::to_vec(record).map_err(|e| PersistError::json(path, e))?;
    line.push(b'\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| PersistError::io(path, e))?;
    file.write_all(&line)
        .and_then(|_| file.sync_all())
        .map_err(|e| PersistError::io(path, e))?;
    Ok(())
}

/// Read all records, stopping at the first unparseable line.
///
/// A torn tail (crash mid-append) parses as garbage and is discarded
/// with a warning; everything before it is returned.
pub fn read_all<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, PersistError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path).map_err(|e| PersistError::io(path, e))?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(l) => l,
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => break,
            Err(e) => return Err(PersistError::io(path, e)),
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str(trimmed) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    line = index + 1,
                    error = %e,
                    "Discarding torn or corrupt log tail",
                );
                break;
            }
        }
    }

    Ok(records)
}

/// Rewrite the log keeping only the last `keep` records.
///
/// Goes through a temp file + rename so a crash mid-rewrite leaves the
/// original intact.
pub fn retain_last<T: Serialize + DeserializeOwned>(
    path: &Path,
    keep: usize,
) -> Result<(), PersistError> {
    let records: Vec<T> = read_all(path)?;
    if records.len() <= keep {
        return Ok(());
    }

    let tmp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp_path).map_err(|e| PersistError::io(&tmp_path, e))?;
        for record in records.iter().skip(records.len() - keep) {
            let mut line = serde_json::to_vec(record).map_err(|e| PersistError::json(path, e))?;
            line.push(b'\n');
            file.write_all(&line)
                .map_err(|e| PersistError::io(&tmp_path, e))?;
        }
        file.sync_all().map_err(|e| PersistError::io(&tmp_path, e))?;
    }
    fs::rename(&tmp_path, path).map_err(|e| PersistError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
#[path = "jsonl_tests.rs"]
mod tests;
