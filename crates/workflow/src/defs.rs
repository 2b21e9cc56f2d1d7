// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow definition structs (the raw deserialized shape)
//!
//! These mirror the workflow file formats one-to-one. Map keys are
//! injected into `name` fields after parsing, and the whole shape is
//! validated and normalized into a [`crate::graph::TaskGraph`] by the
//! parser.

use indexmap::IndexMap;
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

/// A parsed workflow file: one or more named workflow blocks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowFile {
    #[serde(
        default,
        alias = "workflow",
        deserialize_with = "unique_name_map"
    )]
    pub workflows: IndexMap<String, WorkflowDef>,
}

/// One `workflow "name" { ... }` block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowDef {
    /// Workflow name (injected from the map key)
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Default delegation target(s) for every task in the group
    #[serde(default)]
    pub delegate_to: Option<DelegateTo>,
    /// Worker-pool bound for parallel tasks in this group
    #[serde(default)]
    pub max_workers: Option<usize>,
    #[serde(default)]
    pub hooks: Option<HooksDef>,
    #[serde(default, alias = "task", deserialize_with = "unique_name_map")]
    pub tasks: IndexMap<String, TaskDef>,
}

/// Group-level lifecycle hooks. Both reference tasks in the same group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HooksDef {
    #[serde(default)]
    pub before_all: Option<String>,
    #[serde(default)]
    pub after_all: Option<String>,
}

/// What a task runs.
///
/// Accepts either:
///   `run = "shell command"`      - executed via the target's shell
///   `run = { sleep_ms = 100 }`   - engine-internal sleep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunDirective {
    Shell(String),
    Sleep { sleep_ms: u64 },
}

impl RunDirective {
    pub fn is_shell(&self) -> bool {
        matches!(self, RunDirective::Shell(_))
    }
}

/// Delegation selector: a single agent/selector or a list.
///
/// Each entry is an agent name, `all`, or a `tag:<t>` expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DelegateTo {
    One(String),
    Many(Vec<String>),
}

impl DelegateTo {
    /// Flatten into a selector list.
    pub fn selectors(&self) -> Vec<String> {
        match self {
            DelegateTo::One(s) => vec![s.clone()],
            DelegateTo::Many(list) => list.clone(),
        }
    }
}

/// Circuit-breaker options for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BreakerDef {
    /// Shared breaker name (process-wide state)
    pub name: String,
    /// Consecutive failures before the breaker opens
    pub threshold: u32,
    /// How long the breaker stays open before half-open probing
    pub cooldown: String,
}

/// Rate-limit options for a task (token bucket, shared per task name).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitDef {
    pub permits_per_sec: u32,
}

/// A task within a workflow block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskDef {
    /// Task name (injected from the map key)
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub run: RunDirective,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Eligible to run concurrently with other ready tasks
    #[serde(default)]
    pub parallel: bool,
    /// Extra attempts after the first failure
    #[serde(default)]
    pub retries: u32,
    /// Base backoff between retries (duration string, default 1s)
    #[serde(default)]
    pub retry_backoff: Option<String>,
    /// Wall-clock bound over all attempts (duration string)
    #[serde(default)]
    pub timeout: Option<String>,
    /// Per-task delegation override
    #[serde(default)]
    pub delegate_to: Option<DelegateTo>,
    /// Predicate command; non-zero exit skips the task
    #[serde(default)]
    pub run_if: Option<String>,
    /// Task to run (best-effort) after success
    #[serde(default)]
    pub on_success: Option<String>,
    /// Task to run (best-effort) after terminal failure
    #[serde(default)]
    pub on_failure: Option<String>,
    /// Task that always runs once this task settles
    #[serde(default)]
    pub finally: Option<String>,
    /// Keep running sibling tasks when this one fails
    #[serde(default)]
    pub continue_on_error: bool,
    /// Record a named checkpoint after this task succeeds
    #[serde(default)]
    pub checkpoint: Option<String>,
    /// Working directory relative to the execution root
    #[serde(default)]
    pub workdir: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Free-form parameters exposed as `${params.*}`
    #[serde(default)]
    pub params: HashMap<String, String>,
    /// Output keys collected from `key=value` stdout lines
    #[serde(default)]
    pub exports: Vec<String>,
    #[serde(default)]
    pub circuit_breaker: Option<BreakerDef>,
    #[serde(default)]
    pub rate_limit: Option<RateLimitDef>,
}

/// Deserialize an ordered map, rejecting duplicate keys.
///
/// Plain map deserialization silently keeps the last duplicate; workflow
/// names and task names must be unique, so duplicates are a parse error.
fn unique_name_map<'de, D, V>(deserializer: D) -> Result<IndexMap<String, V>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    struct UniqueNameMap<V>(PhantomData<V>);

    impl<'de, V: Deserialize<'de>> Visitor<'de> for UniqueNameMap<V> {
        type Value = IndexMap<String, V>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map with unique names")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut map = IndexMap::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((key, value)) = access.next_entry::<String, V>()? {
                if map.insert(key.clone(), value).is_some() {
                    return Err(de::Error::custom(format!("duplicate name '{}'", key)));
                }
            }
            Ok(map)
        }
    }

    deserializer.deserialize_map(UniqueNameMap(PhantomData))
}

#[cfg(test)]
#[path = "defs_tests.rs"]
mod tests;
