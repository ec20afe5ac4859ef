//! CLI configuration

use gantry_engine::config::EngineConfig;
use std::path::PathBuf;

/// Configuration shared by all commands
pub struct Config {
    /// Path to the topology manifest
    pub manifest: PathBuf,

    /// Engine tunables loaded from the environment
    pub engine: EngineConfig,
}
