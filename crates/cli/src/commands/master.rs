// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `sloth master`: the registration/control server.
//!
//! Accepts agent control streams, sweeps stale records, and persists
//! the registry snapshot so `sloth run` processes can resolve agents.

use crate::env;
use crate::exit::ExitError;
use clap::Args;
use sloth_core::SystemClock;
use sloth_rpc::{run_sweeper, AgentRegistry, ControlServer, RegistryConfig};
use sloth_storage::paths;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Args)]
pub struct MasterArgs {
    /// Address to listen on for agent control streams
    #[arg(long, default_value = "0.0.0.0:7330")]
    pub listen: String,

    /// Expected agent heartbeat interval in seconds
    #[arg(long, default_value_t = 10)]
    pub heartbeat_secs: u64,
}

pub fn execute(args: MasterArgs) -> Result<(), ExitError> {
    let state_root = env::state_dir()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| ExitError::failure(format!("runtime: {e}")))?;
    runtime.block_on(serve(args, state_root))
}

async fn serve(args: MasterArgs, state_root: std::path::PathBuf) -> Result<(), ExitError> {
    let clock = SystemClock;
    let registry = Arc::new(AgentRegistry::new(
        RegistryConfig {
            heartbeat_interval: Duration::from_secs(args.heartbeat_secs.max(1)),
            grace_multiplier: 3,
        },
        clock,
    ));

    let agents_path = paths::agents_file(&state_root);
    if agents_path.exists() {
        match registry.load(&agents_path) {
            Ok(count) => info!(count, "loaded agent registry snapshot"),
            Err(e) => tracing::warn!(error = %e, "could not load agent registry snapshot"),
        }
        // Stored records may be long stale by now
        registry.sweep();
    }

    let listener = TcpListener::bind(&args.listen)
        .await
        .map_err(|e| ExitError::failure(format!("cannot listen on {}: {e}", args.listen)))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| ExitError::failure(e.to_string()))?;
    println!("master listening on {local_addr}");

    let (event_tx, mut event_rx) = mpsc::channel(64);
    let server = Arc::new(ControlServer::new(Arc::clone(&registry), clock).with_events(event_tx));
    let server_task = tokio::spawn(server.serve(listener));

    let shutdown = Arc::new(AtomicBool::new(false));
    let sweeper_task = tokio::spawn(run_sweeper(Arc::clone(&registry), Arc::clone(&shutdown)));

    // Persist the snapshot on every membership change and periodically
    let save_registry = Arc::clone(&registry);
    let save_path = agents_path.clone();
    let save_task = tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(30));
        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    match event {
                        Some(event) => info!(kind = event.kind(), "registry event"),
                        None => return,
                    }
                }
                _ = tick.tick() => {}
            }
            if let Err(e) = save_registry.save(&save_path) {
                tracing::warn!(error = %e, "could not persist agent registry");
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| ExitError::failure(e.to_string()))?;
    info!("shutting down master");

    shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
    server_task.abort();
    sweeper_task.abort();
    save_task.abort();

    registry
        .save(&agents_path)
        .map_err(|e| ExitError::failure(e.to_string()))?;
    Ok(())
}
