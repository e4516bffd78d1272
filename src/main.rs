//! Stowage - build artifact cache
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use std::process::ExitCode;
use stowage::cli::commands::{self, Context};
use stowage::cli::{Cli, Commands};
use stowage::config::ConfigManager;
use stowage::error::{StowageError, StowageResult};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> StowageResult<()> {
    let cli = Cli::parse();

    // Initialize logging: 0 = info, 1 = debug, 2+ = trace
    let filter = match cli.verbose {
        0 => EnvFilter::new("stowage=info"),
        1 => EnvFilter::new("stowage=debug"),
        _ => EnvFilter::new("stowage=trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    let workdir = match cli.workdir {
        Some(dir) => dir,
        None => std::env::current_dir()
            .map_err(|e| StowageError::io("getting current directory", e))?,
    };
    debug!("Working directory: {}", workdir.display());

    let config_manager = match cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new(&workdir),
    };
    let mut config = config_manager.load().await?;

    // Flags override the config file
    if let Some(root) = cli.storage_root {
        config.storage.root = Some(root);
    }

    match cli.command {
        Commands::Config(args) => commands::config(args, &config_manager, &config).await,
        Commands::Rebuild(args) => commands::rebuild(args, &Context::new(workdir, config)).await,
        Commands::Restore(args) => commands::restore(args, &Context::new(workdir, config)).await,
        Commands::Flush(args) => commands::flush(args, &Context::new(workdir, config)).await,
    }
}

