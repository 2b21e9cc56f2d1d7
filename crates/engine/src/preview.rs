// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plan rendering: what a run would do, relative to the stack's last
//! recorded outputs. Side-effect free.

use sha2::{Digest, Sha256};
use sloth_core::Stack;
use sloth_workflow::{Task, TaskGraph};
use std::fmt::Write as _;

/// What the run would do to one task, relative to the prior state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanAction {
    /// Never ran before
    Create,
    /// Ran before, definition changed since
    Update,
    /// Ran before with the same definition
    Unchanged,
    /// Present in the last outputs but gone from the graph
    Destroy,
}

impl PlanAction {
    pub fn symbol(&self) -> &'static str {
        match self {
            PlanAction::Create => "+",
            PlanAction::Update => "~",
            PlanAction::Unchanged => "=",
            PlanAction::Destroy => "-",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PlanAction::Create => "create",
            PlanAction::Update => "update",
            PlanAction::Unchanged => "unchanged",
            PlanAction::Destroy => "destroy",
        }
    }
}

/// One row of the plan.
#[derive(Debug, Clone)]
pub struct PlanEntry {
    pub group: String,
    pub task: String,
    pub action: PlanAction,
    pub depends_on: Vec<String>,
    /// Delegation selectors the task would target (empty = local)
    pub targets: Vec<String>,
}

/// The rendered plan for a graph against prior stack state.
#[derive(Debug, Clone)]
pub struct Plan {
    pub entries: Vec<PlanEntry>,
}

impl Plan {
    /// Build a plan from the graph and the stack's last outputs.
    pub fn build(graph: &TaskGraph, stack: &Stack) -> Self {
        let mut entries = Vec::new();

        for group in graph.groups.values() {
            for name in group.order.iter().chain(group.hook_tasks.iter()) {
                let Some(task) = group.tasks.get(name) else {
                    continue;
                };
                let action = match stack.last_outputs.get(name) {
                    None => PlanAction::Create,
                    Some(outputs) => {
                        let prior = outputs.get("fingerprint").and_then(|v| v.as_str());
                        if prior == Some(fingerprint(task).as_str()) {
                            PlanAction::Unchanged
                        } else {
                            PlanAction::Update
                        }
                    }
                };
                entries.push(PlanEntry {
                    group: group.name.clone(),
                    task: name.clone(),
                    action,
                    depends_on: task.depends_on.clone(),
                    targets: task
                        .selectors(group)
                        .map(|s| s.to_vec())
                        .unwrap_or_default(),
                });
            }
        }

        // Tasks recorded last run but no longer defined
        let known: std::collections::HashSet<&str> = graph
            .groups
            .values()
            .flat_map(|g| g.tasks.keys())
            .map(|s| s.as_str())
            .collect();
        let mut removed: Vec<&String> = stack
            .last_outputs
            .keys()
            .filter(|name| !known.contains(name.as_str()))
            .collect();
        removed.sort();
        for name in removed {
            entries.push(PlanEntry {
                group: String::new(),
                task: name.clone(),
                action: PlanAction::Destroy,
                depends_on: Vec::new(),
                targets: Vec::new(),
            });
        }

        Self { entries }
    }

    /// Count of entries that would change state.
    pub fn change_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.action != PlanAction::Unchanged)
            .count()
    }
}

/// Stable fingerprint of a task definition, stored in execution outputs
/// so the next preview can tell update from unchanged.
pub fn fingerprint(task: &Task) -> String {
    let serialized = serde_json::to_string(task).unwrap_or_default();
    let digest = Sha256::digest(serialized.as_bytes());
    // 16 hex chars are plenty for change detection
    let mut hex = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        let _ = write!(hex, "{:02x}", byte);
    }
    hex
}

/// Render the plan as text for confirmation.
pub fn render_plan(plan: &Plan, stack_name: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Plan for stack '{}':", stack_name);
    for entry in &plan.entries {
        let mut line = format!("  {} {}", entry.action.symbol(), entry.task);
        if !entry.depends_on.is_empty() {
            let _ = write!(line, "  (after {})", entry.depends_on.join(", "));
        }
        if !entry.targets.is_empty() {
            let _ = write!(line, "  @ {}", entry.targets.join(", "));
        }
        let _ = writeln!(out, "{}", line);
    }
    let _ = writeln!(
        out,
        "{} task(s), {} change(s)",
        plan.entries.len(),
        plan.change_count()
    );
    out
}

#[cfg(test)]
#[path = "preview_tests.rs"]
mod tests;
