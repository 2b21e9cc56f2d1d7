// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `sloth agents`: list the registry snapshot with liveness.

use crate::env;
use crate::exit::ExitError;
use clap::Args;
use sloth_core::{format_duration_ms, SystemClock};
use sloth_rpc::{AgentRegistry, RegistryConfig};
use sloth_storage::paths;
use std::sync::Arc;

#[derive(Args)]
pub struct AgentsArgs {
    /// Emit JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: AgentsArgs) -> Result<(), ExitError> {
    let state_root = env::state_dir()?;
    let clock = SystemClock;
    let registry = Arc::new(AgentRegistry::new(RegistryConfig::default(), clock));

    let agents_path = paths::agents_file(&state_root);
    if agents_path.exists() {
        registry
            .load(&agents_path)
            .map_err(|e| ExitError::failure(e.to_string()))?;
        registry.sweep();
    }

    let records = registry.list();
    if args.json {
        let json = serde_json::to_string_pretty(&records)
            .map_err(|e| ExitError::failure(e.to_string()))?;
        println!("{json}");
        return Ok(());
    }

    if records.is_empty() {
        println!("no agents registered (is a master running?)");
        return Ok(());
    }

    println!(
        "{:<20} {:<22} {:<14} {:<20} {}",
        "NAME", "ADDRESS", "STATE", "TAGS", "LAST SEEN"
    );
    let now = sloth_core::Clock::epoch_ms(&clock);
    for record in records {
        let age = now.saturating_sub(record.last_seen_ms);
        println!(
            "{:<20} {:<22} {:<14} {:<20} {} ago",
            record.name,
            record.address,
            record.state,
            record.tags.join(","),
            format_duration_ms(age),
        );
    }
    Ok(())
}
