// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Duration rendering for logs and run output.
//!
//! Mirrors the unit vocabulary of workflow duration strings (`ms`, `s`,
//! `m`, `h`): a rendered duration is always valid input for a timeout
//! or backoff field. At most two adjacent units are shown, so output
//! stays scannable (`"1m30s"`, never `"1m30s250ms"`).

/// Render milliseconds in workflow duration syntax.
///
/// Sub-second values keep millisecond precision (`"450ms"`); longer
/// values round down to the two largest non-zero units (`"12s"`,
/// `"1m30s"`, `"2h5m"`). Hours accumulate without a day unit, matching
/// what the duration parser accepts.
pub fn format_duration_ms(ms: u64) -> String {
    if ms < 1_000 {
        return format!("{ms}ms");
    }

    let total_secs = ms / 1_000;
    let hours = total_secs / 3_600;
    let minutes = (total_secs % 3_600) / 60;
    let secs = total_secs % 60;

    let (major, minor) = if hours > 0 {
        (format!("{hours}h"), nonzero_unit(minutes, "m"))
    } else if minutes > 0 {
        (format!("{minutes}m"), nonzero_unit(secs, "s"))
    } else {
        (format!("{secs}s"), None)
    };

    match minor {
        Some(minor) => format!("{major}{minor}"),
        None => major,
    }
}

fn nonzero_unit(value: u64, unit: &str) -> Option<String> {
    (value > 0).then(|| format!("{value}{unit}"))
}

#[cfg(test)]
#[path = "time_fmt_tests.rs"]
mod tests;
