// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The immutable, validated task graph
//!
//! A [`TaskGraph`] is the parser's product and the engine's sole input:
//! a map of group name → [`TaskGroup`], each carrying normalized tasks,
//! resolved hooks, and a precomputed topological order with lexicographic
//! tie-breaks.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Normalized command form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Run via the target's shell
    Shell(String),
    /// Engine-internal sleep for the given milliseconds
    Sleep(u64),
}

/// Normalized circuit-breaker options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSpec {
    pub name: String,
    pub threshold: u32,
    pub cooldown_ms: u64,
}

/// Normalized rate-limit options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSpec {
    pub permits_per_sec: u32,
}

/// Group-level lifecycle hooks, validated to reference existing tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupHooks {
    pub before_all: Option<String>,
    pub after_all: Option<String>,
}

/// A validated, normalized task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub command: Command,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub retries: u32,
    /// Base backoff between retries; the engine scales it linearly by
    /// attempt number.
    pub retry_backoff_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Delegation selectors (agent names, `all`, `tag:<t>`); `None` means
    /// the group default, and an empty group default means local.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate_to: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_if: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_failure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finally: Option<String>,
    #[serde(default)]
    pub continue_on_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub params: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exports: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<BreakerSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitSpec>,
}

impl Task {
    /// Delegation selectors for this task, falling back to the group default.
    pub fn selectors<'a>(&'a self, group: &'a TaskGroup) -> Option<&'a [String]> {
        self.delegate_to
            .as_deref()
            .or(group.delegate_to.as_deref())
    }
}

/// A named, ordered collection of tasks: the unit of preview and
/// confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskGroup {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate_to: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,
    #[serde(default)]
    pub hooks: GroupHooks,
    pub tasks: IndexMap<String, Task>,
    /// Topological order of schedulable (non-hook) task names,
    /// lexicographic among ties.
    pub order: Vec<String>,
    /// Names of tasks referenced only as hooks (excluded from `order`).
    #[serde(default)]
    pub hook_tasks: BTreeSet<String>,
}

impl TaskGroup {
    /// Look up a task by name.
    pub fn get(&self, name: &str) -> Option<&Task> {
        self.tasks.get(name)
    }

    /// Whether the named task is a hook (runs out of band).
    pub fn is_hook(&self, name: &str) -> bool {
        self.hook_tasks.contains(name)
    }

    /// Tasks that participate in dependency scheduling, in topological order.
    pub fn schedulable(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().filter_map(|name| self.tasks.get(name))
    }

    /// Direct dependents of the given task (schedulable tasks only).
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        self.order
            .iter()
            .filter_map(|n| self.tasks.get(n))
            .filter(|t| t.depends_on.iter().any(|d| d == name))
            .map(|t| t.name.as_str())
            .collect()
    }
}

/// The immutable product of parsing: group name → group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskGraph {
    pub groups: IndexMap<String, TaskGroup>,
}

impl TaskGraph {
    pub fn get(&self, group: &str) -> Option<&TaskGroup> {
        self.groups.get(group)
    }

    /// Total number of tasks across all groups (hooks included).
    pub fn task_count(&self) -> usize {
        self.groups.values().map(|g| g.tasks.len()).sum()
    }

    /// Whether any task references the `${secret.*}` namespace.
    ///
    /// Used to abort early when no password was supplied.
    pub fn references_secrets(&self) -> bool {
        use crate::template::{scan, Namespace, Placeholder};

        let uses_secret = |template: &str| {
            scan(template).iter().any(|p| {
                matches!(p, Placeholder::Ref(r) if r.namespace == Namespace::Secret)
            })
        };

        self.groups.values().any(|group| {
            group.tasks.values().any(|task| {
                let command_refs = match &task.command {
                    Command::Shell(cmd) => uses_secret(cmd),
                    Command::Sleep(_) => false,
                };
                command_refs || task.run_if.as_deref().map_or(false, |p| uses_secret(p))
            })
        })
    }
}

/// Compute a topological order over `tasks`, excluding `exclude` (hook
/// tasks), breaking ties lexicographically by task name.
///
/// Returns `Err(cycle_members)` when the dependency relation is cyclic:
/// the names (sorted) that could not be ordered.
pub fn topo_order(
    tasks: &IndexMap<String, Task>,
    exclude: &BTreeSet<String>,
) -> Result<Vec<String>, Vec<String>> {
    let included: Vec<&Task> = tasks
        .values()
        .filter(|t| !exclude.contains(&t.name))
        .collect();

    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for task in &included {
        in_degree.entry(task.name.as_str()).or_insert(0);
        for dep in &task.depends_on {
            *in_degree.entry(task.name.as_str()).or_insert(0) += 1;
            dependents
                .entry(dep.as_str())
                .or_default()
                .push(task.name.as_str());
        }
    }

    // Lexicographic ready set for deterministic ordering
    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(n, _)| *n)
        .collect();

    let mut order = Vec::with_capacity(included.len());
    while let Some(&name) = ready.iter().next() {
        ready.remove(name);
        order.push(name.to_string());
        for dependent in dependents.get(name).map(|v| v.as_slice()).unwrap_or(&[]) {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(dependent);
                }
            }
        }
    }

    if order.len() != included.len() {
        let ordered: HashSet<&str> = order.iter().map(|s| s.as_str()).collect();
        let mut cycle: Vec<String> = included
            .iter()
            .filter(|t| !ordered.contains(t.name.as_str()))
            .map(|t| t.name.clone())
            .collect();
        cycle.sort();
        return Err(cycle);
    }

    Ok(order)
}

/// Transitive dependency closure of a task (names of all ancestors).
pub fn ancestors(tasks: &IndexMap<String, Task>, name: &str) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut stack: Vec<&str> = tasks
        .get(name)
        .map(|t| t.depends_on.iter().map(|s| s.as_str()).collect())
        .unwrap_or_default();

    while let Some(current) = stack.pop() {
        if seen.insert(current.to_string()) {
            if let Some(task) = tasks.get(current) {
                stack.extend(task.depends_on.iter().map(|s| s.as_str()));
            }
        }
    }
    seen
}

#[cfg(test)]
#[path = "graph_tests.rs"]
mod tests;
