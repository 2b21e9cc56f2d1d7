// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run and stack identifiers.
//!
//! Both are UUID-backed strings, but they live different lives: a
//! [`RunId`] is minted once per runner invocation and stamped on every
//! event and execution record, while a [`StackId`] is minted when a
//! stack is first created and then persists for the stack's lifetime.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How many characters of a run id user-facing messages show.
const RUN_ID_DISPLAY_LEN: usize = 8;

/// Unique identifier for a single run of a workflow.
///
/// Appears on every event and recorded execution so a failure report
/// can be correlated with the durable event log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    /// Mint a fresh run id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wrap an existing id (replay, tests).
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for user-facing messages. Uses the first
    /// [`RUN_ID_DISPLAY_LEN`] characters, which is unambiguous enough
    /// within one stack's retained history.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(RUN_ID_DISPLAY_LEN)
            .map(|(idx, _)| idx)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl PartialEq<str> for RunId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for RunId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Stable identifier for a stack (a persistent workflow identity).
///
/// Minted once at stack creation; the stack index maps it to the
/// on-disk directory, so it must never change after that.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StackId(pub String);

impl StackId {
    /// Mint the id for a newly created stack.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wrap an existing id (index lookups, tests).
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StackId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl PartialEq<str> for StackId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for StackId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
