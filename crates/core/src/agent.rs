// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote agent records

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Connection state of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// Heartbeating within the grace window
    Connected,
    /// Missed heartbeats past the grace window, or never seen this session
    Disconnected,
    /// Finishing in-flight work; not eligible for new dispatch
    Draining,
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentState::Connected => write!(f, "connected"),
            AgentState::Disconnected => write!(f, "disconnected"),
            AgentState::Draining => write!(f, "draining"),
        }
    }
}

/// A remote worker known to the registry.
///
/// Agents do not own tasks; they serve ephemeral execution requests.
/// The registry record is the single source of truth for delegation
/// resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub name: String,
    /// host:port the agent's command server listens on
    pub address: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub state: AgentState,
    /// Epoch milliseconds of the last Hello or Heartbeat
    pub last_seen_ms: u64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub capabilities: HashMap<String, String>,
}

impl AgentRecord {
    /// Create a freshly connected record.
    pub fn connected(
        name: impl Into<String>,
        address: impl Into<String>,
        tags: Vec<String>,
        capabilities: HashMap<String, String>,
        epoch_ms: u64,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            tags,
            state: AgentState::Connected,
            last_seen_ms: epoch_ms,
            capabilities,
        }
    }

    /// Whether this agent carries the given tag.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Whether the agent is eligible for new work.
    pub fn is_dispatchable(&self) -> bool {
        self.state == AgentState::Connected
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
