// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent registry: the directory of remote workers.
//!
//! The registry is the sole source of truth for delegation resolution.
//! The master's control server feeds it from Hello/Heartbeat frames; a
//! sweeper marks agents disconnected once they miss heartbeats past the
//! grace window; `sloth run` processes load its persisted snapshot.

use crate::error::RpcError;
use parking_lot::RwLock;
use sloth_core::{AgentRecord, AgentState, Clock};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Registry tuning.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Expected heartbeat cadence from agents.
    pub heartbeat_interval: Duration,
    /// Missed-heartbeat grace, as a multiple of the interval.
    pub grace_multiplier: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(10),
            grace_multiplier: 3,
        }
    }
}

impl RegistryConfig {
    /// Age past which a silent agent counts as disconnected.
    pub fn grace(&self) -> Duration {
        self.heartbeat_interval * self.grace_multiplier
    }
}

/// Errors from delegation resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("unknown agent '{selector}'")]
    NotFound { selector: String },

    #[error("no agents match selector '{selector}'")]
    NoMatches { selector: String },

    #[error("agent '{name}' is {state}")]
    Unavailable { name: String, state: String },
}

/// Directory of remote agents, shared read-mostly.
pub struct AgentRegistry<C: Clock> {
    inner: Arc<RwLock<HashMap<String, AgentRecord>>>,
    config: RegistryConfig,
    clock: C,
}

impl<C: Clock> AgentRegistry<C> {
    pub fn new(config: RegistryConfig, clock: C) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Upsert an agent from a Hello frame; resets `last_seen` and state.
    pub fn register(
        &self,
        name: &str,
        address: &str,
        tags: Vec<String>,
        capabilities: HashMap<String, String>,
    ) -> AgentRecord {
        let record = AgentRecord::connected(name, address, tags, capabilities, self.clock.epoch_ms());
        self.inner.write().insert(name.to_string(), record.clone());
        record
    }

    /// Record a heartbeat. Returns false for unknown agents (the control
    /// server treats that as a protocol error and asks for a new Hello).
    pub fn heartbeat(&self, name: &str) -> bool {
        let mut inner = self.inner.write();
        match inner.get_mut(name) {
            Some(record) => {
                record.last_seen_ms = self.clock.epoch_ms();
                if record.state == AgentState::Disconnected {
                    record.state = AgentState::Connected;
                }
                true
            }
            None => false,
        }
    }

    /// Remove an agent entirely.
    pub fn unregister(&self, name: &str) -> Option<AgentRecord> {
        self.inner.write().remove(name)
    }

    /// Mark an agent draining: finishes in-flight work, gets no new tasks.
    pub fn mark_draining(&self, name: &str) -> bool {
        let mut inner = self.inner.write();
        match inner.get_mut(name) {
            Some(record) => {
                record.state = AgentState::Draining;
                true
            }
            None => false,
        }
    }

    /// Mark an agent disconnected (stream broke or sweep expired it).
    pub fn mark_disconnected(&self, name: &str) {
        if let Some(record) = self.inner.write().get_mut(name) {
            record.state = AgentState::Disconnected;
        }
    }

    /// Look up one agent by exact name.
    pub fn lookup(&self, name: &str) -> Option<AgentRecord> {
        self.inner.read().get(name).cloned()
    }

    /// All agents, sorted by name.
    pub fn list(&self) -> Vec<AgentRecord> {
        let mut records: Vec<AgentRecord> = self.inner.read().values().cloned().collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    /// Resolve a selector to agent records.
    ///
    /// Selector forms: exact agent name, `all`, or `tag:<t>`. An exact
    /// name that is not registered is [`ResolveError::NotFound`]; a
    /// tag/all selector with zero matches is [`ResolveError::NoMatches`].
    pub fn resolve(&self, selector: &str) -> Result<Vec<AgentRecord>, ResolveError> {
        let inner = self.inner.read();
        let mut matches: Vec<AgentRecord> = if selector == "all" {
            inner.values().cloned().collect()
        } else if let Some(tag) = selector.strip_prefix("tag:") {
            inner.values().filter(|a| a.has_tag(tag)).cloned().collect()
        } else {
            return inner
                .get(selector)
                .cloned()
                .map(|record| vec![record])
                .ok_or_else(|| ResolveError::NotFound {
                    selector: selector.to_string(),
                });
        };

        if matches.is_empty() {
            return Err(ResolveError::NoMatches {
                selector: selector.to_string(),
            });
        }
        matches.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(matches)
    }

    /// Mark agents disconnected when their last heartbeat is older than
    /// the grace window. Returns the names that flipped.
    pub fn sweep(&self) -> Vec<String> {
        let now = self.clock.epoch_ms();
        let grace_ms = self.config.grace().as_millis() as u64;
        let mut flipped = Vec::new();

        let mut inner = self.inner.write();
        for record in inner.values_mut() {
            if record.state == AgentState::Connected
                && now.saturating_sub(record.last_seen_ms) > grace_ms
            {
                record.state = AgentState::Disconnected;
                flipped.push(record.name.clone());
            }
        }
        flipped.sort();
        flipped
    }

    /// Persist the registry snapshot (atomic write).
    pub fn save(&self, path: &Path) -> Result<(), RpcError> {
        let records = self.list();
        sloth_storage::atomic::save_json(path, &records)
            .map_err(|e| RpcError::protocol(format!("failed to save registry: {e}")))
    }

    /// Load a previously persisted snapshot, replacing current contents.
    ///
    /// Loaded records keep their stored `last_seen`; a sweep right after
    /// load classifies them as connected or stale.
    pub fn load(&self, path: &Path) -> Result<usize, RpcError> {
        let records: Vec<AgentRecord> = sloth_storage::atomic::load_json(path, "agent registry")
            .map_err(|e| RpcError::protocol(format!("failed to load registry: {e}")))?
            .unwrap_or_default();

        let mut inner = self.inner.write();
        inner.clear();
        let count = records.len();
        for record in records {
            inner.insert(record.name.clone(), record);
        }
        Ok(count)
    }

    /// Whether a record's heartbeat is within the grace window right now.
    pub fn is_fresh(&self, record: &AgentRecord) -> bool {
        let now = self.clock.epoch_ms();
        now.saturating_sub(record.last_seen_ms) <= self.config.grace().as_millis() as u64
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
