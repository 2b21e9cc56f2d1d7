// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-run ambient state.

use crate::bus::EventBus;
use crate::cancel::CancelToken;
use parking_lot::Mutex;
use sloth_core::{Clock, RunId, StackId};
use sloth_workflow::template::RenderVars;
use sloth_workflow::Task;
use std::collections::HashMap;
use std::sync::Arc;

/// Ambient state owned by the runner for the duration of one run.
///
/// `exports` is the only cross-task mutable state; writes are whole-map
/// merges at task completion under a single mutex.
pub struct RunContext<C: Clock> {
    pub run_id: RunId,
    pub stack_id: StackId,
    pub stack_name: String,
    /// User-supplied inputs (`${values.*}`)
    pub values: HashMap<String, String>,
    /// Decrypted secrets for this run (`${secret.*}`); empty without a password
    pub secrets: HashMap<String, String>,
    exports: Mutex<HashMap<String, HashMap<String, String>>>,
    pub bus: Arc<EventBus<C>>,
    pub cancel: CancelToken,
    pub clock: C,
}

impl<C: Clock> RunContext<C> {
    pub fn new(
        run_id: RunId,
        stack_id: StackId,
        stack_name: impl Into<String>,
        values: HashMap<String, String>,
        secrets: HashMap<String, String>,
        bus: Arc<EventBus<C>>,
        cancel: CancelToken,
        clock: C,
    ) -> Self {
        Self {
            run_id,
            stack_id,
            stack_name: stack_name.into(),
            values,
            secrets,
            exports: Mutex::new(HashMap::new()),
            bus,
            cancel,
            clock,
        }
    }

    /// Merge one task's exports under its name (whole-map merge).
    pub fn merge_exports(&self, task: &str, exports: HashMap<String, String>) {
        if exports.is_empty() {
            return;
        }
        self.exports.lock().insert(task.to_string(), exports);
    }

    /// Snapshot of all exports published so far.
    pub fn exports_snapshot(&self) -> HashMap<String, HashMap<String, String>> {
        self.exports.lock().clone()
    }

    /// Snapshot the data a task's templates render against: the run's
    /// values and secrets, the task's own params, and every export
    /// published so far.
    pub fn render_vars(&self, task: &Task) -> RenderVars {
        RenderVars {
            values: self.values.clone(),
            secrets: self.secrets.clone(),
            params: task.params.clone(),
            exports: self.exports.lock().clone(),
        }
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
