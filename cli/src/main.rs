// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # atomgraph CLI
//!
//! One binary, three kinds of process:
//!
//! - `atomgraph start [--visualize]` (default): the Instance Supervisor
//! - `atomgraph control-server` / `atomgraph graph-server`: one role each,
//!   normally spawned by the supervisor
//! - `atomgraph status`: read-only port report
//!
//! Logs go to stderr. Stdout carries the control role's envelope stream.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use atomgraph::commands::{self, GlobalOptions};

/// Coordinate atom graph role processes on this host
#[derive(Parser)]
#[command(name = "atomgraph")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "ATOMGRAPH_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "ATOMGRAPH_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Control role port (default: 8090)
    #[arg(long, global = true)]
    control_port: Option<u16>,

    /// Graph role port (default: 3000)
    #[arg(long, global = true)]
    graph_port: Option<u16>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Supervise role processes (default)
    Start {
        /// Also run the graph visualization role
        #[arg(long)]
        visualize: bool,
    },

    /// Run the control role in this process
    #[command(name = "control-server")]
    ControlServer {
        #[arg(long)]
        port: Option<u16>,

        /// Forward atoms to the graph role, launching it if needed
        #[arg(long)]
        visualize: bool,
    },

    /// Run the graph role in this process
    #[command(name = "graph-server")]
    GraphServer {
        #[arg(long)]
        port: Option<u16>,
    },

    /// Show which role ports are served, stuck or free
    Status,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };

    // Exit here rather than returning: a pending stdin read would otherwise
    // hold the runtime open.
    std::process::exit(code);
}

async fn run() -> Result<i32> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    let options = GlobalOptions {
        config_path: cli.config,
        log_level: Some(cli.log_level),
        control_port: cli.control_port,
        graph_port: cli.graph_port,
    };

    match cli.command.unwrap_or(Commands::Start { visualize: false }) {
        Commands::Start { visualize } => commands::start::run(&options, visualize).await,
        Commands::ControlServer { port, visualize } => {
            commands::role::control_server(&options, port, visualize).await
        }
        Commands::GraphServer { port } => commands::role::graph_server(&options, port).await,
        Commands::Status => commands::status::run(&options).await,
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
