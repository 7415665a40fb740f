// src/main.rs

//! solewatch CLI
//!
//! Polls every configured store and pushes Discord alerts on restocks.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use solewatch::error::Result;
use solewatch::models::Config;
use solewatch::notify;
use solewatch::pipeline;

/// solewatch - Sneaker Restock Monitor
#[derive(Parser, Debug)]
#[command(name = "solewatch", version, about = "Sneaker restock monitor")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "data/config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll all configured stores until interrupted
    Run,

    /// Validate the configuration file
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load(&cli.config)?;
    config.validate()?;
    log::info!("Loaded configuration from {}", cli.config.display());

    match cli.command {
        Command::Run => pipeline::run_monitors(&config).await?,
        Command::Validate => {
            notify::validate_webhook_urls(&config.webhooks)?;
            log::info!(
                "Config OK ({} stores, {} webhooks, {} proxies)",
                config.stores.len(),
                config.webhooks.len(),
                config.proxies.len()
            );
        }
    }

    Ok(())
}
