//! Teardown command handler

use anyhow::Result;
use colored::*;
use gantry_core::run::RunId;
use gantry_engine::pipeline::teardown_run;

use crate::commands::{load_topology, runtime};
use crate::config::Config;

/// Stop and remove everything a run created
///
/// Works from the manifest plus the run id alone, so it cleans up after
/// crashed and kill -9'd runs too. Always exits 0: teardown reports issues
/// instead of failing.
pub async fn teardown(config: &Config, run_id: &str) -> Result<i32> {
    let topology = load_topology(config)?;
    let run = RunId::parse(run_id)?;
    let docker = runtime(config).await?;

    let report = teardown_run(docker, &topology, &config.engine, run).await;

    if report.clean() {
        println!("{}", "✓ Teardown complete".green().bold());
    } else {
        println!("{}", "✓ Teardown finished with issues".yellow().bold());
        for issue in &report.issues {
            println!(
                "  {} {} {}: {}",
                "▸".yellow(),
                issue.action,
                issue.container.bold(),
                issue.message.dimmed()
            );
        }
    }
    println!("  {report}");

    Ok(0)
}
