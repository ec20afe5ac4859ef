//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod build;
mod init;
mod release;
mod run;
mod teardown;
mod topology;

use anyhow::{Context, Result};
use clap::Subcommand;
use std::sync::Arc;

use gantry_core::run::RunId;
use gantry_core::topology::Topology;
use gantry_engine::docker::DockerCli;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Build every image in the manifest
    BuildImages {
        /// Reuse an existing run id instead of generating one
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Build images and start the topology, leaving it up
    StartTopology {
        /// Reuse an existing run id instead of generating one
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Run the full pipeline: build, start, test, tear down
    RunTests {
        /// Reuse an existing run id instead of generating one
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Stop and remove everything a run created
    Teardown {
        /// Id of the run whose resources should be swept
        #[arg(long)]
        run_id: String,
    },
    /// Bump the version and stamp the changelog
    Release {
        /// Which version component to bump
        #[arg(long, value_enum, default_value = "patch")]
        level: release::Level,

        /// Entry recorded under the new version heading
        #[arg(short, long, default_value = "Maintenance release")]
        message: String,

        /// Changelog file to stamp
        #[arg(long, default_value = "CHANGELOG.md")]
        changelog: String,
    },
    /// Write a starter manifest into the current directory
    Init {
        /// Overwrite an existing manifest
        #[arg(long)]
        force: bool,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module and returns the
/// process exit code.
pub async fn handle_command(command: Commands, config: &Config) -> Result<i32> {
    match command {
        Commands::BuildImages { run_id } => build::build_images(config, run_id).await,
        Commands::StartTopology { run_id } => topology::start_topology(config, run_id).await,
        Commands::RunTests { run_id } => run::run_tests(config, run_id).await,
        Commands::Teardown { run_id } => teardown::teardown(config, &run_id).await,
        Commands::Release {
            level,
            message,
            changelog,
        } => release::release(level, &message, &changelog),
        Commands::Init { force } => init::init(config, force),
    }
}

/// Loads and validates the topology manifest
pub(crate) fn load_topology(config: &Config) -> Result<Topology> {
    Topology::from_json_file(&config.manifest)
        .with_context(|| format!("Failed to load manifest {}", config.manifest.display()))
}

/// Parses a supplied run id or generates a fresh one
pub(crate) fn resolve_run_id(run_id: Option<String>) -> Result<RunId> {
    match run_id {
        Some(text) => Ok(RunId::parse(&text)?),
        None => Ok(RunId::generate()),
    }
}

/// Builds a runtime handle after checking the binary answers
pub(crate) async fn runtime(config: &Config) -> Result<Arc<DockerCli>> {
    let docker = DockerCli::from_config(&config.engine);
    docker.check_available().await.with_context(|| {
        format!(
            "Container runtime '{}' is not available",
            config.engine.runtime_bin
        )
    })?;
    Ok(Arc::new(docker))
}
