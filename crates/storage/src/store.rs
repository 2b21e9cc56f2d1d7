// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The stack store: persistent workflow state, executions, and history.

use crate::atomic::{self, PersistError};
use crate::jsonl;
use crate::paths;
use crate::secrets::SALT_LEN;
use crate::slug::slugify;
use fs2::FileExt;
use parking_lot::Mutex;
use sloth_core::{Checkpoint, Clock, RunStatus, Stack, StackExecution, StackId, StackStatus};
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Executions kept per stack; older records are discarded oldest-first.
pub const MAX_EXECUTIONS: usize = 100;

/// Errors that can occur in stack store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("stack not found: {id}")]
    NotFound { id: String },

    #[error("corrupt stack record in {path}: {message}")]
    Corrupt { path: String, message: String },
}

/// Mapping of stack id → directory slug, persisted atomically.
type StackIndex = HashMap<String, String>;

/// Persistent store for stacks and their run history.
///
/// All mutating operations serialize per stack: an in-process lock map
/// guards same-process callers and an advisory file lock guards
/// concurrent processes.
pub struct StackStore<C: Clock> {
    root: PathBuf,
    clock: C,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<C: Clock> StackStore<C> {
    /// Open a store rooted at the given state directory.
    pub fn new(root: impl Into<PathBuf>, clock: C) -> Self {
        Self {
            root: root.into(),
            clock,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The state root this store operates under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn stacks_dir(&self) -> PathBuf {
        paths::stacks_dir(&self.root)
    }

    fn index_path(&self) -> PathBuf {
        self.stacks_dir().join("index.json")
    }

    fn load_index(&self) -> Result<StackIndex, StoreError> {
        Ok(atomic::load_json(&self.index_path(), "stack index")?.unwrap_or_default())
    }

    /// Resolve the directory of a stack by id.
    pub fn stack_dir(&self, id: &StackId) -> Result<PathBuf, StoreError> {
        let index = self.load_index()?;
        let slug = index.get(id.as_str()).ok_or_else(|| StoreError::NotFound {
            id: id.to_string(),
        })?;
        Ok(self.stacks_dir().join(slug))
    }

    /// Open the stack with the given name, creating it if absent.
    ///
    /// Idempotent by name: repeated calls return the same record.
    pub fn get_or_create(
        &self,
        name: &str,
        workflow_name: &str,
        file_path: &Path,
    ) -> Result<Stack, StoreError> {
        let slug = slugify(name);
        self.with_slug_lock(&slug, || {
            let dir = self.stacks_dir().join(&slug);
            let stack_path = dir.join("stack.json");

            if let Some(mut stack) = atomic::load_json::<Stack>(&stack_path, "stack record")? {
                // Re-point at the current workflow file if it moved
                if stack.file_path != file_path {
                    stack.file_path = file_path.to_path_buf();
                    stack.updated_at_ms = self.clock.epoch_ms();
                    atomic::save_json(&stack_path, &stack)?;
                }
                return Ok(stack);
            }

            let id = StackId::generate();
            let stack = Stack::new(
                id.clone(),
                name,
                workflow_name,
                file_path.to_path_buf(),
                self.clock.epoch_ms(),
            );
            atomic::save_json(&stack_path, &stack)?;

            let mut index = self.load_index()?;
            index.insert(id.to_string(), slug.clone());
            atomic::save_json(&self.index_path(), &index)?;

            Ok(stack)
        })
    }

    /// Load a stack by name without creating it.
    pub fn find_by_name(&self, name: &str) -> Result<Option<Stack>, StoreError> {
        let dir = self.stacks_dir().join(slugify(name));
        Ok(atomic::load_json(&dir.join("stack.json"), "stack record")?)
    }

    /// Load a stack by id.
    pub fn get(&self, id: &StackId) -> Result<Stack, StoreError> {
        let dir = self.stack_dir(id)?;
        atomic::load_json(&dir.join("stack.json"), "stack record")?.ok_or_else(|| StoreError::NotFound {
            id: id.to_string(),
        })
    }

    /// Update only the lifecycle status of a stack.
    pub fn update_status(&self, id: &StackId, status: StackStatus) -> Result<(), StoreError> {
        self.mutate_stack(id, |stack| {
            stack.status = status;
        })
    }

    /// Append one completed execution to the stack's history.
    ///
    /// The append is a single fsynced line, so after a crash the record
    /// is either fully present or fully absent. At most
    /// [`MAX_EXECUTIONS`] records are kept, oldest discarded first.
    pub fn record_execution(
        &self,
        id: &StackId,
        execution: &StackExecution,
    ) -> Result<(), StoreError> {
        let dir = self.stack_dir(id)?;
        let slug = dir_slug(&dir);
        self.with_slug_lock(&slug, || {
            let log = dir.join("executions.jsonl");
            jsonl::append(&log, execution)?;
            jsonl::retain_last::<StackExecution>(&log, MAX_EXECUTIONS)?;
            Ok(())
        })
    }

    /// Update the stack record after a run: status, last outputs,
    /// duration, and error.
    pub fn update_after_execution(
        &self,
        id: &StackId,
        status: RunStatus,
        duration_ms: u64,
        error: Option<String>,
        outputs: HashMap<String, HashMap<String, serde_json::Value>>,
    ) -> Result<(), StoreError> {
        self.mutate_stack(id, |stack| {
            stack.status = match status {
                RunStatus::Success => StackStatus::Completed,
                RunStatus::Failed | RunStatus::Cancelled => StackStatus::Failed,
            };
            stack.last_duration_ms = duration_ms;
            stack.last_error = error;
            stack.last_outputs = outputs;
        })
    }

    /// Get the stack's salt, creating a random one on first call.
    ///
    /// The salt is immutable once created; secret keys derive from it.
    pub fn get_salt(&self, id: &StackId) -> Result<[u8; SALT_LEN], StoreError> {
        let dir = self.stack_dir(id)?;
        let slug = dir_slug(&dir);
        self.with_slug_lock(&slug, || {
            let stack_path = dir.join("stack.json");
            let mut stack: Stack =
                atomic::load_json(&stack_path, "stack record")?.ok_or_else(|| StoreError::NotFound {
                    id: id.to_string(),
                })?;

            if let Some(encoded) = &stack.salt_b64 {
                let bytes = BASE64
                    .decode(encoded)
                    .map_err(|e| StoreError::Corrupt {
                        path: stack_path.display().to_string(),
                        message: format!("bad salt encoding: {e}"),
                    })?;
                return bytes.try_into().map_err(|_| StoreError::Corrupt {
                    path: stack_path.display().to_string(),
                    message: "salt has wrong length".to_string(),
                });
            }

            let salt: [u8; SALT_LEN] = rand::random();
            stack.salt_b64 = Some(BASE64.encode(salt));
            stack.updated_at_ms = self.clock.epoch_ms();
            atomic::save_json(&stack_path, &stack)?;
            Ok(salt)
        })
    }

    /// List the most recent executions, newest first.
    pub fn list_history(
        &self,
        id: &StackId,
        limit: usize,
    ) -> Result<Vec<StackExecution>, StoreError> {
        let dir = self.stack_dir(id)?;
        let mut records: Vec<StackExecution> = jsonl::read_all(&dir.join("executions.jsonl"))?;
        records.reverse();
        records.truncate(limit);
        Ok(records)
    }

    /// Record a logical checkpoint emitted by a task.
    pub fn record_checkpoint(
        &self,
        id: &StackId,
        checkpoint: &Checkpoint,
    ) -> Result<(), StoreError> {
        let dir = self.stack_dir(id)?;
        let slug = dir_slug(&dir);
        self.with_slug_lock(&slug, || {
            jsonl::append(&dir.join("checkpoints.jsonl"), checkpoint)?;
            Ok(())
        })
    }

    /// List recorded checkpoints, oldest first.
    pub fn list_checkpoints(&self, id: &StackId) -> Result<Vec<Checkpoint>, StoreError> {
        let dir = self.stack_dir(id)?;
        Ok(jsonl::read_all(&dir.join("checkpoints.jsonl"))?)
    }

    fn mutate_stack(
        &self,
        id: &StackId,
        apply: impl FnOnce(&mut Stack),
    ) -> Result<(), StoreError> {
        let dir = self.stack_dir(id)?;
        let slug = dir_slug(&dir);
        self.with_slug_lock(&slug, || {
            let stack_path = dir.join("stack.json");
            let mut stack: Stack =
                atomic::load_json(&stack_path, "stack record")?.ok_or_else(|| StoreError::NotFound {
                    id: id.to_string(),
                })?;
            apply(&mut stack);
            stack.updated_at_ms = self.clock.epoch_ms();
            atomic::save_json(&stack_path, &stack)?;
            Ok(())
        })
    }

    /// Serialize a mutation per stack directory: in-process mutex plus an
    /// advisory file lock for cross-process callers.
    fn with_slug_lock<T>(
        &self,
        slug: &str,
        f: impl FnOnce() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let guard = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(slug.to_string()).or_default())
        };
        let _in_process = guard.lock();

        let dir = self.stacks_dir().join(slug);
        fs::create_dir_all(&dir)?;
        let lock_file = File::create(dir.join(".lock"))?;
        lock_file.lock_exclusive()?;
        let result = f();
        let _ = FileExt::unlock(&lock_file);
        result
    }
}

fn dir_slug(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
