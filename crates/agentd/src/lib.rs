// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sloth-agentd: the remote agent daemon (`slothd`)
//!
//! Serves the command plane (one child process per connection, output
//! streamed back as chunks, TERM → grace → KILL on cancellation) and
//! optionally keeps a control link registered with a master.

pub mod env;
pub mod server;

pub use server::CommandServer;
