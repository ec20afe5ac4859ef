//! Start-topology command handler

use anyhow::Result;
use colored::*;
use gantry_core::run::{EXIT_INTERRUPTED, EXIT_SETUP_FAILURE};
use gantry_engine::pipeline::{Pipeline, PipelineError};

use crate::commands::{load_topology, resolve_run_id, runtime};
use crate::config::Config;

enum StartFlow {
    Started,
    Setup(PipelineError),
    Interrupted,
}

/// Build images and start the topology, leaving it running
///
/// On success the containers stay up for interactive debugging or repeated
/// test runs. On any failure, and on ctrl-c, the partial topology is torn
/// down before the command exits.
pub async fn start_topology(config: &Config, run_id: Option<String>) -> Result<i32> {
    let declared = load_topology(config)?;
    let run = resolve_run_id(run_id)?;
    let docker = runtime(config).await?;

    let mut pipeline = Pipeline::with_run_id(docker, config.engine.clone(), declared, run);

    let flow = tokio::select! {
        result = async {
            pipeline.build_images().await?;
            pipeline.launch_topology().await
        } => match result {
            Ok(()) => StartFlow::Started,
            Err(error) => StartFlow::Setup(error),
        },
        _ = tokio::signal::ctrl_c() => StartFlow::Interrupted,
    };

    match flow {
        StartFlow::Started => {
            println!("{}", "✓ Topology is up!".green().bold());
            for handle in pipeline.handles() {
                println!(
                    "  {} {} {}",
                    "▸".cyan(),
                    handle.service.bold(),
                    handle.container_name.dimmed()
                );
            }
            println!();
            println!("{}", "Next steps:".bold());
            println!("  1. Point your tests at the running services");
            println!(
                "  2. Use {} when you are done",
                format!("gantry teardown --run-id {}", pipeline.run_id()).cyan()
            );
            Ok(0)
        }
        StartFlow::Setup(error) => {
            println!("{}", format!("✗ Start failed: {error}").red().bold());
            let report = pipeline.teardown().await;
            println!("  Teardown: {report}");
            Ok(EXIT_SETUP_FAILURE)
        }
        StartFlow::Interrupted => {
            println!("{}", "✗ Interrupted, tearing down".yellow().bold());
            let report = pipeline.teardown().await;
            println!("  Teardown: {report}");
            Ok(EXIT_INTERRUPTED)
        }
    }
}
