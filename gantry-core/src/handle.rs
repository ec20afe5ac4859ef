//! Container handles
//!
//! Every container the orchestrator touches is tracked through a handle from
//! the moment its name is derived. Status only moves forward, so teardown can
//! trust a `Removed` handle to mean the resource is truly gone.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Lifecycle status of a tracked container
///
/// Ordering is the lifecycle: a status never moves back to an earlier
/// variant. Skipping forward is allowed (a container that failed to start
/// goes straight from `Building` to `Removed` during the sweep).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerStatus {
    /// Named and registered, no runtime resource yet
    Building,
    /// Start call returned
    Running,
    /// Stopped but the container resource still exists
    Stopped,
    /// Removed from the runtime
    Removed,
}

impl ContainerStatus {
    /// Whether teardown has nothing left to do for this status
    pub fn is_terminal(&self) -> bool {
        matches!(self, ContainerStatus::Removed)
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ContainerStatus::Building => "building",
            ContainerStatus::Running => "running",
            ContainerStatus::Stopped => "stopped",
            ContainerStatus::Removed => "removed",
        };
        write!(f, "{text}")
    }
}

/// Rejected attempt to move a container status backwards
#[derive(Debug, Error)]
#[error("container status cannot move from {from} back to {to}")]
pub struct StatusRegression {
    pub from: ContainerStatus,
    pub to: ContainerStatus,
}

/// A tracked container within one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerHandle {
    /// The service this container realizes
    pub service: String,

    /// Full run-scoped container name
    pub container_name: String,

    /// Runtime-assigned id, set once the start call returns
    pub runtime_id: Option<String>,

    status: ContainerStatus,
}

impl ContainerHandle {
    /// Registers a new handle at the start of the lifecycle
    pub fn new(service: impl Into<String>, container_name: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            container_name: container_name.into(),
            runtime_id: None,
            status: ContainerStatus::Building,
        }
    }

    pub fn status(&self) -> ContainerStatus {
        self.status
    }

    /// Moves the status forward; same-state transitions are no-ops
    pub fn advance(&mut self, to: ContainerStatus) -> Result<(), StatusRegression> {
        if to < self.status {
            return Err(StatusRegression {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}
