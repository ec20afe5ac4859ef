//! Run identity and outcome types
//!
//! A run id scopes every resource a pipeline creates. All container names,
//! the network name and the image tags are derived from it, so a later
//! `teardown --run-id` can re-derive exactly what to sweep without any
//! state file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Exit code for failures before or while standing up the topology
pub const EXIT_SETUP_FAILURE: i32 = 125;

/// Exit code when the test run exceeds its configured timeout
pub const EXIT_TEST_TIMEOUT: i32 = 124;

/// Exit code when the pipeline is interrupted (ctrl-c)
pub const EXIT_INTERRUPTED: i32 = 130;

/// A run id that is not usable in container or network names
#[derive(Debug, Error)]
#[error("invalid run id '{0}': expected an alphanumeric token with [_.-] separators")]
pub struct InvalidRunId(pub String);

/// Unique identifier scoping one pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Generates a fresh id of the form `gantry-1a2b3c4d`
    pub fn generate() -> Self {
        let token = Uuid::new_v4().simple().to_string();
        Self(format!("gantry-{}", &token[..8]))
    }

    /// Accepts an externally supplied id after checking it is name-safe
    pub fn parse(text: &str) -> Result<Self, InvalidRunId> {
        let mut chars = text.chars();
        let valid = match chars.next() {
            Some(c) if c.is_ascii_alphanumeric() => {
                chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
            }
            _ => false,
        };
        if !valid {
            return Err(InvalidRunId(text.to_string()));
        }
        Ok(Self(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short token used in image tags
    fn tag_token(&self) -> &str {
        self.0.strip_prefix("gantry-").unwrap_or(&self.0)
    }

    /// Container name for a service in this run
    pub fn container_name(&self, service: &str) -> String {
        format!("{}-{}", self.0, service)
    }

    /// Name of the bridge network all containers of this run attach to
    pub fn network_name(&self) -> String {
        format!("{}-net", self.0)
    }

    /// Run-scoped image tag under the given repository
    pub fn image_tag(&self, repo: &str) -> String {
        format!("{}:{}", repo, self.tag_token())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of the foreground test-runner process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// Exit code of the test process, reported verbatim
    pub exit_code: i32,

    /// When the exit code was captured
    pub captured_at: DateTime<Utc>,
}

impl RunResult {
    pub fn new(exit_code: i32) -> Self {
        Self {
            exit_code,
            captured_at: Utc::now(),
        }
    }

    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

/// Phases of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Init,
    Building,
    Launching,
    Testing,
    Teardown,
    Done,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PipelineState::Init => "init",
            PipelineState::Building => "building",
            PipelineState::Launching => "launching",
            PipelineState::Testing => "testing",
            PipelineState::Teardown => "teardown",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        };
        write!(f, "{text}")
    }
}
