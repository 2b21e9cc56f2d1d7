// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sloth agent daemon (slothd)
//!
//! Remote worker process: serves the command plane and, when a master
//! address is given, keeps a registration/heartbeat link alive with
//! jittered exponential reconnect.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use clap::Parser;
use sloth_agentd::{env, CommandServer};
use sloth_rpc::ControlLink;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "slothd",
    version,
    about = "Sloth-Runner agent daemon - serves remote task execution"
)]
struct Args {
    /// Agent name, unique across the fleet
    #[arg(long)]
    name: String,

    /// Address to listen on for command streams
    #[arg(long, default_value = "0.0.0.0:7331")]
    listen: String,

    /// Address the master should dial back (defaults to --listen)
    #[arg(long)]
    advertise: Option<String>,

    /// Master control address; omit to run standalone
    #[arg(long)]
    master: Option<String>,

    /// Comma-separated tags for selector matching
    #[arg(long, value_delimiter = ',')]
    tags: Vec<String>,

    /// Heartbeat interval in seconds
    #[arg(long, default_value_t = 10)]
    heartbeat_secs: u64,

    /// Log to this file instead of the default state-dir location
    #[arg(long)]
    log_file: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let _log_guard = setup_logging(&args)?;

    let listener = TcpListener::bind(&args.listen).await?;
    let local_addr = listener.local_addr()?;
    let advertise = args
        .advertise
        .clone()
        .unwrap_or_else(|| local_addr.to_string());
    info!(name = %args.name, listen = %local_addr, "agent starting");

    // Control link first so the drain flag reaches the command server
    let mut control_task = None;
    let draining = if let Some(master) = &args.master {
        let link = ControlLink::new(
            master,
            &args.name,
            &advertise,
            args.tags.clone(),
            Duration::from_secs(args.heartbeat_secs.max(1)),
        );
        let draining = link.draining_flag();
        control_task = Some(tokio::spawn(async move { link.maintain().await }));
        draining
    } else {
        info!("no master configured, running standalone");
        Arc::new(std::sync::atomic::AtomicBool::new(false))
    };

    let server = Arc::new(CommandServer::new(draining));
    let server_task = tokio::spawn(server.serve(listener));

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
    }

    server_task.abort();
    if let Some(task) = control_task {
        task.abort();
    }
    info!("agent stopped");
    Ok(())
}

fn setup_logging(
    args: &Args,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>, Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_new(env::log_filter())?;

    let log_path = args.log_file.clone().or_else(env::log_path);
    match log_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
            Ok(None)
        }
    }
}
