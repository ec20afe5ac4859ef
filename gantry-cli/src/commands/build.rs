//! Build-images command handler

use anyhow::Result;
use colored::*;
use gantry_core::run::EXIT_SETUP_FAILURE;
use gantry_engine::pipeline::Pipeline;

use crate::commands::{load_topology, resolve_run_id, runtime};
use crate::config::Config;

/// Build every image in the manifest without starting anything
///
/// Tags are scoped to the run id, so passing the same id to a later
/// start-topology or run-tests reuses exactly these images.
pub async fn build_images(config: &Config, run_id: Option<String>) -> Result<i32> {
    let topology = load_topology(config)?;
    let run = resolve_run_id(run_id)?;
    let docker = runtime(config).await?;

    let mut pipeline = Pipeline::with_run_id(docker, config.engine.clone(), topology, run);

    match pipeline.build_images().await {
        Ok(()) => {
            println!("{}", "✓ All images built!".green().bold());
            println!("  Run id: {}", pipeline.run_id().to_string().cyan());
            println!();
            println!("{}", "Next steps:".bold());
            println!(
                "  1. Use {} to start the topology",
                format!("gantry start-topology --run-id {}", pipeline.run_id()).cyan()
            );
            println!(
                "  2. Or run {} for the full pipeline",
                "gantry run-tests".cyan()
            );
            Ok(0)
        }
        Err(err) => {
            println!("{}", format!("✗ Build failed: {err}").red().bold());
            Ok(EXIT_SETUP_FAILURE)
        }
    }
}
