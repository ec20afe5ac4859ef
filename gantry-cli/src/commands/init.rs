//! Init command handler

use anyhow::{Context, Result, bail};
use colored::*;
use std::fs;

use crate::config::Config;

/// Starter manifest mirroring a typical scheduler test topology
const STARTER_MANIFEST: &str = r#"{
  "name": "itest",
  "services": [
    {
      "name": "zookeeper",
      "build_context": "dockerfiles/zookeeper",
      "readiness": { "type": "command", "argv": ["nc", "-z", "localhost", "2181"] }
    },
    {
      "name": "resource-manager",
      "build_context": "dockerfiles/resource-manager",
      "depends_on": ["zookeeper"]
    },
    {
      "name": "scheduler",
      "build_context": "dockerfiles/scheduler",
      "depends_on": ["resource-manager"]
    }
  ],
  "test_runner": {
    "name": "itest",
    "build_context": "dockerfiles/itest"
  }
}
"#;

/// Write a starter manifest at the configured manifest path
pub fn init(config: &Config, force: bool) -> Result<i32> {
    if config.manifest.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            config.manifest.display()
        );
    }

    fs::write(&config.manifest, STARTER_MANIFEST)
        .with_context(|| format!("Failed to write {}", config.manifest.display()))?;

    println!(
        "  {} {}",
        "Created".green(),
        config.manifest.display().to_string().cyan()
    );
    println!();
    println!("{}", "Next steps:".bold());
    println!("  1. Point each build_context at a directory holding a Dockerfile");
    println!(
        "  2. Run {} to exercise the topology",
        "gantry run-tests".cyan()
    );

    Ok(0)
}
