// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Streaming command client (master side of the command plane).

use crate::error::{RpcError, RpcErrorKind};
use crate::proto::{CommandChunk, RunCommandRequest};
use crate::wire;
use std::time::Duration;
use tokio::net::TcpStream;

/// Default connect deadline for a command dispatch.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default per-chunk idle deadline. This protects against a stuck
/// network, not a slow command: the task-level timeout is enforced
/// separately by the runner and the agent.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Aggregated outcome of one streamed command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    /// Agent-side invocation error (spawn failure etc.); the command
    /// never produced an exit code.
    pub error: Option<String>,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.error.is_none() && self.exit_code == 0
    }
}

/// Client for one agent's command server.
#[derive(Debug, Clone)]
pub struct CommandClient {
    address: String,
    connect_timeout: Duration,
    idle_timeout: Duration,
}

impl CommandClient {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, connect: Duration, idle: Duration) -> Self {
        self.connect_timeout = connect;
        self.idle_timeout = idle;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Dispatch a command and drain its chunk stream.
    ///
    /// Chunks accumulate into a [`CommandOutcome`]; ordering within each
    /// logical channel follows the order the agent produced them.
    /// Cancellation is propagated by dropping the returned future - the
    /// connection closes and the agent kills the child process.
    pub async fn run(&self, request: &RunCommandRequest) -> Result<CommandOutcome, RpcError> {
        let mut stream = tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect(&self.address),
        )
        .await
        .map_err(|_| RpcError::timeout("connect"))??;

        wire::write_message(&mut stream, request, wire::DEFAULT_FRAME_TIMEOUT).await?;

        let mut outcome = CommandOutcome::default();
        loop {
            let chunk: CommandChunk = wire::read_message(&mut stream, self.idle_timeout).await?;

            if let Some(data) = chunk.stdout_chunk {
                outcome.stdout.push_str(&data);
            }
            if let Some(data) = chunk.stderr_chunk {
                outcome.stderr.push_str(&data);
            }
            if chunk.finished {
                match (chunk.error, chunk.exit_code) {
                    (Some(error), _) => outcome.error = Some(error),
                    (None, Some(code)) => outcome.exit_code = code,
                    (None, None) => {
                        return Err(RpcError::new(
                            RpcErrorKind::Protocol,
                            "final chunk carried neither exit code nor error",
                        ))
                    }
                }
                return Ok(outcome);
            }
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
