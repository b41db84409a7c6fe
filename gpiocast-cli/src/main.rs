// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! gpiocast CLI
//!
//! Command-line interface for the GPIO event broadcast service.

use clap::{Parser, Subcommand};

mod commands;

/// gpiocast - Broadcast GPIO button events to local subscribers
#[derive(Parser)]
#[command(name = "gpiocast")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (defaults apply when omitted)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the broadcast service until Ctrl+C
    Serve {
        /// GPIO line to monitor (overrides the config file)
        #[arg(short, long)]
        gpio: Option<i32>,

        /// Do not sample the line; events are published externally
        #[arg(long)]
        external: bool,
    },

    /// Subscribe and print events as they arrive
    Watch {
        /// Print one JSON object per notice
        #[arg(long)]
        json: bool,
    },

    /// Show a snapshot of the running service
    Status {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        file: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Serve { gpio, external } => {
            commands::serve::execute(config, gpio, external).await
        }
        Commands::Watch { json } => commands::watch::execute(config, json).await,
        Commands::Status { json } => commands::status::execute(config, json).await,
        Commands::Validate { file } => commands::validate::execute(&file).await,
    }
}
