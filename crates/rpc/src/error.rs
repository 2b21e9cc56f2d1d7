// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport error taxonomy
//!
//! Every transport-level failure collapses into a single [`RpcError`]
//! with a machine-readable [`RpcErrorKind`]; the runner's retry policy
//! branches on the kind, never on message text.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Machine-readable transport failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcErrorKind {
    /// Connection refused by the peer
    Refused,
    /// Name resolution failed
    Dns,
    /// Peer rejected our identity or credentials
    Auth,
    /// Connection reset, closed, or broken mid-stream
    Reset,
    /// Transport-level deadline elapsed (distinct from task timeouts)
    Timeout,
    /// Malformed or oversized frame
    Protocol,
}

impl fmt::Display for RpcErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcErrorKind::Refused => write!(f, "refused"),
            RpcErrorKind::Dns => write!(f, "dns"),
            RpcErrorKind::Auth => write!(f, "auth"),
            RpcErrorKind::Reset => write!(f, "reset"),
            RpcErrorKind::Timeout => write!(f, "timeout"),
            RpcErrorKind::Protocol => write!(f, "protocol"),
        }
    }
}

/// A transport failure with its classification.
#[derive(Debug, Clone, Error)]
#[error("rpc error ({kind}): {message}")]
pub struct RpcError {
    pub kind: RpcErrorKind,
    pub message: String,
}

impl RpcError {
    pub fn new(kind: RpcErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(what: &str) -> Self {
        Self::new(RpcErrorKind::Timeout, format!("{what} timed out"))
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(RpcErrorKind::Protocol, message)
    }
}

impl From<std::io::Error> for RpcError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;
        let kind = match e.kind() {
            ErrorKind::ConnectionRefused => RpcErrorKind::Refused,
            ErrorKind::TimedOut | ErrorKind::WouldBlock => RpcErrorKind::Timeout,
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof
            | ErrorKind::NotConnected => RpcErrorKind::Reset,
            // getaddrinfo failures surface as uncategorized errors
            _ if e.to_string().contains("lookup") => RpcErrorKind::Dns,
            _ => RpcErrorKind::Reset,
        };
        Self::new(kind, e.to_string())
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(e: serde_json::Error) -> Self {
        Self::protocol(e.to_string())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
