// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task and run outcome types

use crate::event::SkipReason;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Final status of a single task within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Command completed and reported success
    Success,
    /// Command failed after all retry attempts
    Failed,
    /// Task never ran (run_if false, dependency failed, or hook untriggered)
    Skipped,
    /// The timeout wrapper cancelled the command
    TimedOut,
    /// The run was cancelled while this task was in flight or pending
    Cancelled,
}

impl TaskStatus {
    /// Whether this status counts as a successful completion.
    pub fn is_success(&self) -> bool {
        matches!(self, TaskStatus::Success)
    }

    /// Whether this status terminates dependents (failed / timed out / cancelled).
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            TaskStatus::Failed | TaskStatus::TimedOut | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Success => write!(f, "success"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Skipped => write!(f, "skipped"),
            TaskStatus::TimedOut => write!(f, "timed_out"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Aggregate status of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failed,
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success => write!(f, "success"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Per-task outcome recorded after a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub status: TaskStatus,
    /// Epoch milliseconds when the first attempt started (0 for skipped tasks)
    pub started_at_ms: u64,
    pub duration_ms: u64,
    /// Total attempts made (>= 1 for tasks that ran, 0 for skipped)
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Why the task was skipped, when status is `Skipped`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    /// Opaque output map published by the command (stdout, exit_code,
    /// declared exports, per-target results for fan-out tasks)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub output: HashMap<String, serde_json::Value>,
}

impl TaskResult {
    /// Result for a task that never ran.
    pub fn skipped(reason: SkipReason) -> Self {
        Self {
            status: TaskStatus::Skipped,
            started_at_ms: 0,
            duration_ms: 0,
            attempts: 0,
            error: None,
            skip_reason: Some(reason),
            output: HashMap::new(),
        }
    }

    /// Result for a task cancelled before or while running.
    pub fn cancelled(started_at_ms: u64, duration_ms: u64, attempts: u32) -> Self {
        Self {
            status: TaskStatus::Cancelled,
            started_at_ms,
            duration_ms,
            attempts,
            error: Some("cancelled".to_string()),
            skip_reason: None,
            output: HashMap::new(),
        }
    }
}

/// Tally of task statuses across a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub success: u32,
    pub failed: u32,
    pub skipped: u32,
    pub cancelled: u32,
}

impl StatusCounts {
    /// Tally results; timed-out tasks count as failed.
    pub fn tally<'a>(results: impl IntoIterator<Item = &'a TaskResult>) -> Self {
        let mut counts = Self::default();
        for result in results {
            match result.status {
                TaskStatus::Success => counts.success += 1,
                TaskStatus::Failed | TaskStatus::TimedOut => counts.failed += 1,
                TaskStatus::Skipped => counts.skipped += 1,
                TaskStatus::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> u32 {
        self.success + self.failed + self.skipped + self.cancelled
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
