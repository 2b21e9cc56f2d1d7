// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured run/task events consumed by sinks

use crate::id::RunId;
use crate::task::{RunStatus, TaskStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a task was skipped instead of run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The run_if predicate evaluated false
    RunIfFalse,
    /// A dependency failed, timed out, or was itself skipped
    DependencyFailed,
    /// The task is a hook that never triggered this run
    HookNotTriggered,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::RunIfFalse => write!(f, "run_if_false"),
            SkipReason::DependencyFailed => write!(f, "dependency_failed"),
            SkipReason::HookNotTriggered => write!(f, "hook_not_triggered"),
        }
    }
}

/// Events emitted at every state transition of a run.
///
/// Serializes with `{"type": "task.start", ...fields}` format. The kind
/// set is closed; sinks switch on the variant, never on string prefixes.
/// Every run-scoped event carries the run id and stack name so it can be
/// correlated externally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // -- workflow --
    #[serde(rename = "workflow.start")]
    WorkflowStart {
        run_id: RunId,
        stack: String,
        workflow: String,
        epoch_ms: u64,
    },

    #[serde(rename = "workflow.end")]
    WorkflowEnd {
        run_id: RunId,
        stack: String,
        workflow: String,
        status: RunStatus,
        duration_ms: u64,
        epoch_ms: u64,
    },

    // -- task --
    #[serde(rename = "task.start")]
    TaskStart {
        run_id: RunId,
        stack: String,
        task: String,
        epoch_ms: u64,
    },

    /// One event per retry, before the backoff sleep.
    #[serde(rename = "task.retry")]
    TaskRetry {
        run_id: RunId,
        stack: String,
        task: String,
        /// Attempt number that just failed (1-based)
        attempt: u32,
        backoff_ms: u64,
        error: String,
        epoch_ms: u64,
    },

    #[serde(rename = "task.end")]
    TaskEnd {
        run_id: RunId,
        stack: String,
        task: String,
        status: TaskStatus,
        duration_ms: u64,
        attempts: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        epoch_ms: u64,
    },

    #[serde(rename = "task.skipped")]
    TaskSkipped {
        run_id: RunId,
        stack: String,
        task: String,
        reason: SkipReason,
        epoch_ms: u64,
    },

    /// A logical checkpoint recorded by a task (persisted to the stack store).
    #[serde(rename = "task.checkpoint")]
    TaskCheckpoint {
        run_id: RunId,
        stack: String,
        task: String,
        name: String,
        epoch_ms: u64,
    },

    // -- agent --
    #[serde(rename = "agent.connect")]
    AgentConnect {
        name: String,
        address: String,
        epoch_ms: u64,
    },

    #[serde(rename = "agent.disconnect")]
    AgentDisconnect { name: String, epoch_ms: u64 },

    // -- bus internal --
    /// A slow sink overflowed its queue and oldest events were dropped.
    #[serde(rename = "sink.overrun")]
    SinkOverrun {
        sink: String,
        dropped: u64,
        epoch_ms: u64,
    },
}

impl Event {
    /// Short kind string for logs and filters (matches the serde tag).
    pub fn kind(&self) -> &'static str {
        match self {
            Event::WorkflowStart { .. } => "workflow.start",
            Event::WorkflowEnd { .. } => "workflow.end",
            Event::TaskStart { .. } => "task.start",
            Event::TaskRetry { .. } => "task.retry",
            Event::TaskEnd { .. } => "task.end",
            Event::TaskSkipped { .. } => "task.skipped",
            Event::TaskCheckpoint { .. } => "task.checkpoint",
            Event::AgentConnect { .. } => "agent.connect",
            Event::AgentDisconnect { .. } => "agent.disconnect",
            Event::SinkOverrun { .. } => "sink.overrun",
        }
    }

    /// The run this event belongs to, if run-scoped.
    pub fn run_id(&self) -> Option<&RunId> {
        match self {
            Event::WorkflowStart { run_id, .. }
            | Event::WorkflowEnd { run_id, .. }
            | Event::TaskStart { run_id, .. }
            | Event::TaskRetry { run_id, .. }
            | Event::TaskEnd { run_id, .. }
            | Event::TaskSkipped { run_id, .. }
            | Event::TaskCheckpoint { run_id, .. } => Some(run_id),
            Event::AgentConnect { .. } | Event::AgentDisconnect { .. } => None,
            Event::SinkOverrun { .. } => None,
        }
    }

    /// The task this event concerns, if task-scoped.
    pub fn task(&self) -> Option<&str> {
        match self {
            Event::TaskStart { task, .. }
            | Event::TaskRetry { task, .. }
            | Event::TaskEnd { task, .. }
            | Event::TaskSkipped { task, .. }
            | Event::TaskCheckpoint { task, .. } => Some(task),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
