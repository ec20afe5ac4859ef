//! Run-tests command handler

use anyhow::Result;
use colored::*;
use gantry_engine::pipeline::{Pipeline, PipelineOutcome};

use crate::commands::{load_topology, resolve_run_id, runtime};
use crate::config::Config;

/// Run the full pipeline: build, launch, test, tear down
///
/// The exit code is the test process's own on a test failure, 125 when the
/// harness could not stand the topology up, 124 on test timeout and 130 on
/// ctrl-c. Teardown runs on every one of those paths.
pub async fn run_tests(config: &Config, run_id: Option<String>) -> Result<i32> {
    let topology = load_topology(config)?;
    let run = resolve_run_id(run_id)?;
    let docker = runtime(config).await?;

    println!("{}", format!("Starting run {run}").bold());

    let pipeline = Pipeline::with_run_id(docker, config.engine.clone(), topology, run);
    let report = pipeline.execute().await;

    match &report.outcome {
        PipelineOutcome::Passed => {
            println!("{}", "✓ Tests passed!".green().bold());
        }
        PipelineOutcome::TestFailed { exit_code } => {
            println!(
                "{}",
                format!("✗ Tests failed with exit code {exit_code}").red().bold()
            );
        }
        PipelineOutcome::SetupFailed { error } => {
            println!("{}", format!("✗ Setup failed: {error}").red().bold());
        }
        PipelineOutcome::Interrupted => {
            println!("{}", "✗ Interrupted".yellow().bold());
        }
    }

    println!("  Teardown: {}", report.teardown);
    for handle in &report.handles {
        println!(
            "  {} {} {}",
            "▸".cyan(),
            handle.service.bold(),
            handle.status().to_string().dimmed()
        );
    }

    Ok(report.outcome.exit_code())
}
