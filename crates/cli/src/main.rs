// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! sloth - Sloth-Runner CLI

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod commands;
mod env;
mod exit;
mod output;
mod ssh_profile;

use clap::{Parser, Subcommand};
use commands::{agents, master, run};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "sloth",
    version,
    about = "Sloth-Runner - a distributed workflow orchestrator"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow against a stack
    Run(run::RunArgs),
    /// Run the master control server (agent registration and liveness)
    Master(master::MasterArgs),
    /// List registered agents
    Agents(agents::AgentsArgs),
}

fn main() {
    setup_logging();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run(args) => run::execute(args),
        Commands::Master(args) => master::execute(args),
        Commands::Agents(args) => agents::execute(args),
    };

    match result {
        Ok(()) => {}
        Err(e) => {
            eprintln!("error: {}", e.message);
            std::process::exit(e.code);
        }
    }
}

fn setup_logging() {
    let filter = EnvFilter::try_new(env::log_filter())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
