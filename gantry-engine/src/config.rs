//! Engine configuration
//!
//! All tunables come from the environment with working defaults, so a bare
//! `gantry run-tests` needs no setup. Values that fail to parse fall back to
//! the default rather than aborting.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("runtime binary must not be empty")]
    EmptyRuntimeBin,

    #[error("{name} must be greater than zero")]
    ZeroDuration { name: &'static str },
}

/// Engine tunables
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Container runtime binary (default: docker)
    pub runtime_bin: String,

    /// Per-image build timeout
    pub build_timeout: Duration,

    /// Timeout for individual container start/stop/remove calls
    pub start_timeout: Duration,

    /// How long a service may take to become ready
    pub ready_timeout: Duration,

    /// Base interval between readiness probe attempts
    pub ready_interval: Duration,

    /// Grace period given to containers on stop before the runtime kills them
    pub stop_grace: Duration,

    /// Overall test-run timeout; `None` lets tests run unbounded
    pub test_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            runtime_bin: "docker".to_string(),
            build_timeout: Duration::from_secs(600),
            start_timeout: Duration::from_secs(60),
            ready_timeout: Duration::from_secs(120),
            ready_interval: Duration::from_millis(500),
            stop_grace: Duration::from_secs(10),
            test_timeout: None,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from environment variables
    ///
    /// Recognized variables:
    /// - GANTRY_RUNTIME_BIN (optional, default: docker)
    /// - GANTRY_BUILD_TIMEOUT (optional, seconds, default: 600)
    /// - GANTRY_START_TIMEOUT (optional, seconds, default: 60)
    /// - GANTRY_READY_TIMEOUT (optional, seconds, default: 120)
    /// - GANTRY_READY_INTERVAL_MS (optional, milliseconds, default: 500)
    /// - GANTRY_STOP_GRACE (optional, seconds, default: 10)
    /// - GANTRY_TEST_TIMEOUT (optional, seconds, 0 disables, default: disabled)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from the given variable lookup
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            runtime_bin: get("GANTRY_RUNTIME_BIN").unwrap_or(defaults.runtime_bin),
            build_timeout: parse_secs(get("GANTRY_BUILD_TIMEOUT"))
                .unwrap_or(defaults.build_timeout),
            start_timeout: parse_secs(get("GANTRY_START_TIMEOUT"))
                .unwrap_or(defaults.start_timeout),
            ready_timeout: parse_secs(get("GANTRY_READY_TIMEOUT"))
                .unwrap_or(defaults.ready_timeout),
            ready_interval: parse_millis(get("GANTRY_READY_INTERVAL_MS"))
                .unwrap_or(defaults.ready_interval),
            stop_grace: parse_secs(get("GANTRY_STOP_GRACE")).unwrap_or(defaults.stop_grace),
            // 0 disables the test timeout
            test_timeout: match parse_secs(get("GANTRY_TEST_TIMEOUT")) {
                Some(d) if d.is_zero() => None,
                Some(d) => Some(d),
                None => defaults.test_timeout,
            },
        }
    }

    /// Checks the configuration is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runtime_bin.trim().is_empty() {
            return Err(ConfigError::EmptyRuntimeBin);
        }
        for (name, value) in [
            ("build timeout", self.build_timeout),
            ("start timeout", self.start_timeout),
            ("ready timeout", self.ready_timeout),
            ("ready interval", self.ready_interval),
            ("stop grace", self.stop_grace),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ZeroDuration { name });
            }
        }
        if let Some(t) = self.test_timeout
            && t.is_zero()
        {
            return Err(ConfigError::ZeroDuration {
                name: "test timeout",
            });
        }
        Ok(())
    }
}

fn parse_secs(value: Option<String>) -> Option<Duration> {
    value
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn parse_millis(value: Option<String>) -> Option<Duration> {
    value
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
}
