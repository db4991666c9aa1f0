// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # volapi
//!
//! The `volapi` binary runs the Triton volumes API: shared NFS volumes
//! backed by storage VMs, plus the reservations that tie them to VMs
//! being provisioned.
//!
//! ## Commands
//!
//! - `volapi serve [--host] [--port] [--standalone]` - Run the HTTP API
//! - `volapi config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use volapi_cli::commands::{self, ConfigCommand, ServeCommand};
use volapi_cli::telemetry::{self, LogFormat};
use volapi_core::domain::config::VolapiConfigManifest;

/// Triton volumes API - NFS shared volumes and volume reservations
#[derive(Parser)]
#[command(name = "volapi")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "VOLAPI_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "VOLAPI_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API server
    #[command(name = "serve")]
    Serve(ServeCommand),

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve(command)) => {
            let config = VolapiConfigManifest::load_or_default(cli.config)
                .context("Failed to load configuration")?;
            let level = telemetry::resolve_log_level(cli.log_level.as_deref(), Some(&config));
            let format = LogFormat::parse(&config.spec.observability.logging.format);
            telemetry::init_logging(&level, format)?;

            commands::serve::execute(command, config).await
        }
        Some(Commands::Config { command }) => {
            let level = cli.log_level.as_deref().unwrap_or("warn");
            telemetry::init_logging(level, LogFormat::Text)?;

            commands::config::handle_command(command, cli.config).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}
