// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sloth-storage: durable per-stack state
//!
//! Every stack owns a directory under the state root:
//!
//! ```text
//! stacks/<slug>/stack.json        - the Stack record (atomic snapshot)
//! stacks/<slug>/executions.jsonl  - append-only run history, fsynced
//! stacks/<slug>/checkpoints.jsonl - logical task checkpoints
//! stacks/<slug>/secrets.json      - encrypted secret map
//! stacks/<slug>/events.jsonl      - durable event log
//! ```
//!
//! Mutations are serialized per stack (in-process lock map plus an
//! advisory file lock) and committed atomically: JSON artifacts stage
//! through a `.pending` sibling before an fsync + rename, log appends
//! are single fsynced lines whose torn tails are discarded on read,
//! and unreadable artifacts are set aside as `.corrupt` instead of
//! wedging later commands.

pub mod atomic;
pub mod event_log;
pub mod jsonl;
pub mod paths;
pub mod secrets;
pub mod slug;
pub mod store;

pub use event_log::EventLog;
pub use paths::state_dir;
pub use secrets::{SecretMap, SecretsError, SecretsStore, SALT_LEN};
pub use slug::slugify;
pub use store::{StackStore, StoreError, MAX_EXECUTIONS};
