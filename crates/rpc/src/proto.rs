// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Protocol messages for both planes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Agent → master messages on the control stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentMessage {
    /// First frame after connect: identity and capabilities.
    Hello {
        name: String,
        /// host:port of the agent's command server
        address: String,
        #[serde(default)]
        tags: Vec<String>,
        #[serde(default)]
        capabilities: HashMap<String, String>,
    },
    /// Periodic liveness signal.
    Heartbeat { name: String },
}

/// Master → agent messages on the control stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Acknowledges a Hello or Heartbeat.
    Ack { server_epoch_ms: u64 },
    /// Finish in-flight work; no new dispatch will arrive.
    Drain,
    /// Close the link and stop reconnecting.
    Disconnect,
}

/// One command invocation, sent as the first frame of a command stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunCommandRequest {
    pub command: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    /// Task-level timeout, enforced agent-side as a hard bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    pub run_id: String,
    pub task_id: String,
}

/// One streamed chunk of command output.
///
/// `stdout_chunk` and `stderr_chunk` are separate logical channels but
/// arrive in the order the agent produced them. The final chunk carries
/// `finished = true` with either an exit code or an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout_chunk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr_chunk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub finished: bool,
}

impl CommandChunk {
    pub fn stdout(data: impl Into<String>) -> Self {
        Self {
            stdout_chunk: Some(data.into()),
            ..Self::default()
        }
    }

    pub fn stderr(data: impl Into<String>) -> Self {
        Self {
            stderr_chunk: Some(data.into()),
            ..Self::default()
        }
    }

    pub fn finished(exit_code: i32) -> Self {
        Self {
            exit_code: Some(exit_code),
            finished: true,
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            finished: true,
            ..Self::default()
        }
    }
}

#[cfg(test)]
#[path = "proto_tests.rs"]
mod tests;
