// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Values files: user-supplied inputs for `${values.*}` references
//!
//! Values files are TOML or JSON. Nested tables flatten with dot
//! notation, so `[db] host = "x"` becomes `values.db.host`. Every leaf
//! is rendered to a string (commands are text).

use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValuesError {
    #[error("failed to read values file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("TOML parse error in values file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON parse error in values file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown values file extension '.{extension}' (expected .toml or .json)")]
    UnknownFormat { extension: String },

    #[error("invalid --set override '{0}' (expected key=value)")]
    BadOverride(String),
}

/// Load a values file into a flat `key → string` map.
pub fn load_values(path: &Path) -> Result<HashMap<String, String>, ValuesError> {
    let content = std::fs::read_to_string(path).map_err(|source| ValuesError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let root: Value = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => {
            let table: toml::Value = toml::from_str(&content)?;
            serde_json::to_value(table)?
        }
        Some("json") => serde_json::from_str(&content)?,
        other => {
            return Err(ValuesError::UnknownFormat {
                extension: other.unwrap_or("").to_string(),
            })
        }
    };

    let mut out = HashMap::new();
    flatten("", &root, &mut out);
    Ok(out)
}

/// Parse a `key=value` override from the command line.
pub fn parse_set_override(raw: &str) -> Result<(String, String), ValuesError> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(ValuesError::BadOverride(raw.to_string())),
    }
}

fn flatten(prefix: &str, value: &Value, out: &mut HashMap<String, String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten(&path, child, out);
            }
        }
        Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        Value::Number(n) => {
            out.insert(prefix.to_string(), n.to_string());
        }
        Value::Bool(b) => {
            out.insert(prefix.to_string(), b.to_string());
        }
        // Arrays and nulls have no string form commands can use; skip them
        Value::Array(_) | Value::Null => {}
    }
}

#[cfg(test)]
#[path = "values_tests.rs"]
mod tests;
