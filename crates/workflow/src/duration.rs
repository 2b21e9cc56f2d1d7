// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Duration string parsing (`"500ms"`, `"30s"`, `"5m"`, `"1h"`)

use std::time::Duration;

/// Parse a duration string of the form `<number><unit>` where unit is
/// one of `ms`, `s`, `m`, `h`.
///
/// Returns a human-readable message on failure; callers wrap it with
/// location context.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }

    let (value, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) if idx > 0 => s.split_at(idx),
        Some(_) => return Err(format!("duration '{}' must start with a number", s)),
        None => return Err(format!("duration '{}' is missing a unit (ms, s, m, h)", s)),
    };

    let n: u64 = value
        .parse()
        .map_err(|_| format!("invalid duration value '{}'", value))?;

    let duration = match unit {
        "ms" => Duration::from_millis(n),
        "s" => Duration::from_secs(n),
        "m" => Duration::from_secs(n * 60),
        "h" => Duration::from_secs(n * 3600),
        other => {
            return Err(format!(
                "unknown duration unit '{}' (expected ms, s, m, h)",
                other
            ))
        }
    };

    if duration.is_zero() {
        return Err(format!("duration '{}' must be greater than zero", s));
    }

    Ok(duration)
}

#[cfg(test)]
#[path = "duration_tests.rs"]
mod tests;
