// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run result rendering.

use clap::ValueEnum;
use sloth_core::{format_duration_ms, Event, RunStatus, TaskStatus};
use sloth_engine::{EventSink, RunOutcome};

/// Output style for run results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Sink that narrates task progress on stdout for text output.
pub struct ConsoleSink;

impl EventSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    fn deliver(&self, event: &Event) -> Result<(), String> {
        match event {
            Event::TaskStart { task, .. } => println!("  → {task}"),
            Event::TaskRetry { task, attempt, backoff_ms, .. } => {
                println!("  ↻ {task} (attempt {attempt} failed, retrying in {})",
                    format_duration_ms(*backoff_ms));
            }
            Event::TaskEnd { task, status, duration_ms, .. } => {
                let mark = match status {
                    TaskStatus::Success => "✓",
                    TaskStatus::Cancelled => "⊘",
                    _ => "✗",
                };
                println!("  {mark} {task} ({})", format_duration_ms(*duration_ms));
            }
            Event::TaskSkipped { task, reason, .. } => {
                println!("  - {task} skipped ({reason})");
            }
            _ => {}
        }
        Ok(())
    }
}

/// Render the final outcome in the requested format.
pub fn render_outcome(outcome: &RunOutcome, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => render_text(outcome),
        OutputFormat::Json => render_json(outcome),
    }
}

fn render_text(outcome: &RunOutcome) -> String {
    use std::fmt::Write as _;

    let mut out = String::new();
    let mut names: Vec<&String> = outcome.results.keys().collect();
    names.sort();

    for name in names {
        let result = &outcome.results[name.as_str()];
        let _ = writeln!(
            out,
            "{:<24} {:<10} {:>8}  attempts={}{}",
            name,
            result.status,
            format_duration_ms(result.duration_ms),
            result.attempts,
            result
                .error
                .as_deref()
                .map(|e| format!("  {e}"))
                .unwrap_or_default(),
        );
    }

    let verdict = match outcome.status {
        RunStatus::Success => "succeeded",
        RunStatus::Failed => "failed",
        RunStatus::Cancelled => "cancelled",
    };
    let _ = writeln!(
        out,
        "\nRun {} in {}",
        verdict,
        format_duration_ms(outcome.duration_ms())
    );
    out
}

fn render_json(outcome: &RunOutcome) -> String {
    let value = serde_json::json!({
        "status": outcome.status,
        "started_at_ms": outcome.started_at_ms,
        "finished_at_ms": outcome.finished_at_ms,
        "duration_ms": outcome.duration_ms(),
        "error": outcome.error,
        "results": outcome.results,
        "exports": outcome.exports,
    });
    serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
