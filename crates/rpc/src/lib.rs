// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sloth-rpc: agent registry and master↔agent transport
//!
//! Two planes over TCP with length-prefixed JSON frames:
//!
//! 1. **Control** (agent dials master): `Hello` then periodic
//!    `Heartbeat`; the master replies `Ack` and may push `Drain` or
//!    `Disconnect`. Broken links reconnect with jittered exponential
//!    backoff.
//! 2. **Command** (master dials agent): one [`RunCommandRequest`], then
//!    a stream of [`CommandChunk`]s until `finished` or a transport
//!    error. Dropping the client side propagates cancellation.

pub mod client;
pub mod control;
pub mod error;
pub mod proto;
pub mod registry;
pub mod wire;

pub use client::{CommandClient, CommandOutcome};
pub use control::{backoff_delay, run_sweeper, ControlLink, ControlServer};
pub use error::{RpcError, RpcErrorKind};
pub use proto::{AgentMessage, CommandChunk, ControlMessage, RunCommandRequest};
pub use registry::{AgentRegistry, RegistryConfig, ResolveError};
