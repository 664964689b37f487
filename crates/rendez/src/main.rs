// SPDX-FileCopyrightText: 2026 Rendez Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rendez - real-time matchmaking and WebRTC signaling service.
//!
//! This is the binary entry point for the Rendez service.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod check;
mod serve;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

/// Rendez - real-time matchmaking and WebRTC signaling service.
#[derive(Parser, Debug)]
#[command(name = "rendez", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the Rendez signaling service.
    Serve {
        /// Config file path (overrides the XDG hierarchy).
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Validate the configuration and print the resolved settings.
    CheckConfig {
        /// Config file path (overrides the XDG hierarchy).
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn load(config: Option<&PathBuf>) -> Result<rendez_config::RendezConfig, rendez_config::ConfigError> {
    match config {
        Some(path) => rendez_config::load_config_from_path(path).map_err(Into::into),
        None => rendez_config::load_config().map_err(Into::into),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => {
            let config = match load(config.as_ref()) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("error: {e}");
                    return ExitCode::FAILURE;
                }
            };
            match serve::run_serve(config).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("error: {e}");
                    ExitCode::FAILURE
                }
            }
        }
        Commands::CheckConfig { config } => match load(config.as_ref()) {
            Ok(config) => check::run_check(&config),
            Err(e) => {
                eprintln!("error: {e:?}");
                ExitCode::FAILURE
            }
        },
    }
}
