//! Gantry CLI
//!
//! Command-line interface for the gantry integration-test orchestrator.

mod commands;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use gantry_engine::config::EngineConfig;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "gantry")]
#[command(about = "Containerized integration-test orchestrator", long_about = None)]
struct Cli {
    /// Path to the topology manifest
    #[arg(
        short = 'f',
        long,
        env = "GANTRY_MANIFEST",
        default_value = "gantry.json"
    )]
    manifest: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gantry_cli=info,gantry_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let engine = EngineConfig::from_env();
    engine.validate().context("Invalid engine configuration")?;

    let config = Config {
        manifest: cli.manifest,
        engine,
    };
    debug!(manifest = %config.manifest.display(), "configuration loaded");

    let code = handle_command(cli.command, &config).await?;
    std::process::exit(code)
}
