// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stack records: persistent workflow identity across runs

use crate::id::{RunId, StackId};
use crate::task::{RunStatus, StatusCounts};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Lifecycle status of a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackStatus {
    /// Created but never run
    New,
    /// A run is currently in flight
    Running,
    /// Last run finished successfully
    Completed,
    /// Last run failed or was cancelled
    Failed,
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackStatus::New => write!(f, "new"),
            StackStatus::Running => write!(f, "running"),
            StackStatus::Completed => write!(f, "completed"),
            StackStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outputs of one task, keyed by output name.
pub type TaskOutputs = HashMap<String, serde_json::Value>;

/// A persistent workflow record.
///
/// Stacks outlive runs: they own the execution history, the last outputs
/// used for preview diffing, and the salt that secret keys derive from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stack {
    pub id: StackId,
    pub name: String,
    pub workflow_name: String,
    pub file_path: PathBuf,
    pub status: StackStatus,
    /// Outputs of the most recent completed run, keyed by task name
    #[serde(default)]
    pub last_outputs: HashMap<String, TaskOutputs>,
    /// Error message of the most recent failed run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Duration of the most recent run in milliseconds
    #[serde(default)]
    pub last_duration_ms: u64,
    /// Per-stack salt for secret key derivation (base64, 16 random bytes).
    /// Created on first use and immutable thereafter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt_b64: Option<String>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Stack {
    /// Create a fresh stack record.
    pub fn new(
        id: StackId,
        name: impl Into<String>,
        workflow_name: impl Into<String>,
        file_path: PathBuf,
        epoch_ms: u64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            workflow_name: workflow_name.into(),
            file_path,
            status: StackStatus::New,
            last_outputs: HashMap::new(),
            last_error: None,
            last_duration_ms: 0,
            salt_b64: None,
            created_at_ms: epoch_ms,
            updated_at_ms: epoch_ms,
        }
    }
}

/// One completed run of a stack's workflow. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackExecution {
    pub run_id: RunId,
    pub started_at_ms: u64,
    pub finished_at_ms: u64,
    pub duration_ms: u64,
    pub status: RunStatus,
    pub counts: StatusCounts,
    /// Full per-task outputs for this run
    #[serde(default)]
    pub outputs: HashMap<String, TaskOutputs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A logical checkpoint recorded by a task mid-run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: RunId,
    pub task: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<serde_json::Value>,
    pub recorded_at_ms: u64,
}

#[cfg(test)]
#[path = "stack_tests.rs"]
mod tests;
