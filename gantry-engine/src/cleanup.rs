//! Cleanup stack and teardown sweep
//!
//! Every container name is registered here before the start call that could
//! create it, so the sweep never misses a resource that half-launched. The
//! sweep itself never fails: individual errors are recorded in the report
//! and the sweep moves on to the next resource.

use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use gantry_core::handle::{ContainerHandle, ContainerStatus};
use gantry_core::run::RunId;

use crate::docker::ContainerRuntime;

/// One failed teardown action, recorded instead of raised
#[derive(Debug, Clone)]
pub struct TeardownIssue {
    pub container: String,
    pub action: &'static str,
    pub message: String,
}

/// What the teardown sweep did
#[derive(Debug, Clone, Default)]
pub struct TeardownReport {
    /// Containers stopped by this sweep
    pub stopped: usize,

    /// Containers removed by this sweep
    pub removed: usize,

    /// Resources that were already gone when the sweep reached them
    pub not_found: usize,

    /// Actions that failed for any other reason
    pub issues: Vec<TeardownIssue>,
}

impl TeardownReport {
    /// Whether the sweep finished without real failures
    pub fn clean(&self) -> bool {
        self.issues.is_empty()
    }
}

impl fmt::Display for TeardownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stopped {}, removed {} container(s)",
            self.stopped, self.removed
        )?;
        if self.not_found > 0 {
            write!(f, ", {} already gone", self.not_found)?;
        }
        if !self.issues.is_empty() {
            write!(f, ", {} issue(s)", self.issues.len())?;
        }
        Ok(())
    }
}

/// Tracks every resource a run creates so teardown can sweep them all
pub struct CleanupStack {
    run: RunId,
    network: Option<String>,
    entries: Vec<ContainerHandle>,
}

impl CleanupStack {
    pub fn new(run: RunId) -> Self {
        Self {
            run,
            network: None,
            entries: Vec::new(),
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run
    }

    /// Registers the run network for removal after all containers are gone
    pub fn register_network(&mut self, name: impl Into<String>) {
        self.network = Some(name.into());
    }

    /// Registers a container name before the call that creates it
    pub fn register(&mut self, service: &str, container_name: &str) {
        debug!(service, container = container_name, "registered for cleanup");
        self.entries.push(ContainerHandle::new(service, container_name));
    }

    /// Registers a container from a previous run for a standalone teardown
    ///
    /// The name is derived from the manifest, not observed, so the handle
    /// assumes the container may still be running.
    pub fn register_existing(&mut self, service: &str, container_name: &str) {
        let mut handle = ContainerHandle::new(service, container_name);
        let _ = handle.advance(ContainerStatus::Running);
        self.entries.push(handle);
    }

    /// Records the runtime id once a start call has returned
    pub fn set_runtime_id(&mut self, container_name: &str, id: impl Into<String>) {
        if let Some(handle) = self.find_mut(container_name) {
            handle.runtime_id = Some(id.into());
        }
    }

    /// Moves a tracked container's status forward
    pub fn advance(&mut self, container_name: &str, to: ContainerStatus) {
        if let Some(handle) = self.find_mut(container_name) {
            if let Err(err) = handle.advance(to) {
                warn!(container = container_name, %err, "ignoring status regression");
            }
        }
    }

    pub fn handles(&self) -> &[ContainerHandle] {
        &self.entries
    }

    pub fn snapshot(&self) -> Vec<ContainerHandle> {
        self.entries.clone()
    }

    /// Whether every tracked resource is confirmed gone
    pub fn fully_removed(&self) -> bool {
        self.network.is_none() && self.entries.iter().all(|h| h.status().is_terminal())
    }

    fn find_mut(&mut self, container_name: &str) -> Option<&mut ContainerHandle> {
        self.entries
            .iter_mut()
            .find(|h| h.container_name == container_name)
    }

    /// Stops and removes every tracked resource, newest first
    ///
    /// Two passes: stop everything, then remove everything, then drop the
    /// network. A container that is already gone counts as swept. Errors are
    /// recorded and never abort the sweep; the sweep is safe to run again.
    pub async fn sweep(
        &mut self,
        runtime: &dyn ContainerRuntime,
        stop_grace: Duration,
    ) -> TeardownReport {
        let mut report = TeardownReport::default();
        debug!(run = %self.run, containers = self.entries.len(), "starting teardown sweep");

        for i in (0..self.entries.len()).rev() {
            if self.entries[i].status() >= ContainerStatus::Stopped {
                continue;
            }
            let name = self.entries[i].container_name.clone();
            match runtime.stop(&name, stop_grace).await {
                Ok(()) => {
                    report.stopped += 1;
                    let _ = self.entries[i].advance(ContainerStatus::Stopped);
                }
                Err(err) if err.is_not_found() => {
                    report.not_found += 1;
                    let _ = self.entries[i].advance(ContainerStatus::Stopped);
                }
                Err(err) => {
                    warn!(container = %name, error = %err, "failed to stop container");
                    report.issues.push(TeardownIssue {
                        container: name,
                        action: "stop",
                        message: err.to_string(),
                    });
                }
            }
        }

        for i in (0..self.entries.len()).rev() {
            if self.entries[i].status() == ContainerStatus::Removed {
                continue;
            }
            let name = self.entries[i].container_name.clone();
            match runtime.remove(&name).await {
                Ok(()) => {
                    report.removed += 1;
                    let _ = self.entries[i].advance(ContainerStatus::Removed);
                }
                Err(err) if err.is_not_found() => {
                    report.not_found += 1;
                    let _ = self.entries[i].advance(ContainerStatus::Removed);
                }
                Err(err) => {
                    warn!(container = %name, error = %err, "failed to remove container");
                    report.issues.push(TeardownIssue {
                        container: name,
                        action: "remove",
                        message: err.to_string(),
                    });
                }
            }
        }

        if let Some(network) = self.network.clone() {
            match runtime.remove_network(&network).await {
                Ok(()) => {
                    self.network = None;
                }
                Err(err) if err.is_not_found() => {
                    report.not_found += 1;
                    self.network = None;
                }
                Err(err) => {
                    warn!(network = %network, error = %err, "failed to remove network");
                    report.issues.push(TeardownIssue {
                        container: network,
                        action: "network-rm",
                        message: err.to_string(),
                    });
                }
            }
        }

        debug!(run = %self.run, %report, "teardown sweep finished");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockRuntime;

    fn running_stack() -> CleanupStack {
        let run = RunId::parse("gantry-test0001").unwrap();
        let mut stack = CleanupStack::new(run.clone());
        stack.register_network(run.network_name());
        for service in ["zk", "rm", "scheduler"] {
            let name = run.container_name(service);
            stack.register(service, &name);
            stack.advance(&name, ContainerStatus::Running);
        }
        stack
    }

    #[tokio::test]
    async fn test_sweep_stops_then_removes_newest_first() {
        let runtime = MockRuntime::new();
        let mut stack = running_stack();

        let report = stack.sweep(&runtime, Duration::from_secs(10)).await;

        assert_eq!(report.stopped, 3);
        assert_eq!(report.removed, 3);
        assert!(report.clean());
        assert!(stack.fully_removed());
        assert_eq!(
            runtime.log_snapshot(),
            vec![
                "stop gantry-test0001-scheduler",
                "stop gantry-test0001-rm",
                "stop gantry-test0001-zk",
                "rm gantry-test0001-scheduler",
                "rm gantry-test0001-rm",
                "rm gantry-test0001-zk",
                "network-rm gantry-test0001-net",
            ]
        );
    }

    #[tokio::test]
    async fn test_second_sweep_is_a_noop() {
        let runtime = MockRuntime::new();
        let mut stack = running_stack();

        stack.sweep(&runtime, Duration::from_secs(10)).await;
        let ops_after_first = runtime.log_snapshot().len();
        let report = stack.sweep(&runtime, Duration::from_secs(10)).await;

        assert_eq!(runtime.log_snapshot().len(), ops_after_first);
        assert_eq!(report.stopped, 0);
        assert_eq!(report.removed, 0);
    }

    #[tokio::test]
    async fn test_already_gone_resources_are_swallowed() {
        let runtime = MockRuntime::new();
        runtime.mark_missing("gantry-test0001-rm");
        let mut stack = running_stack();

        let report = stack.sweep(&runtime, Duration::from_secs(10)).await;

        // Both the stop and the remove of the missing container count
        assert_eq!(report.not_found, 2);
        assert_eq!(report.stopped, 2);
        assert_eq!(report.removed, 2);
        assert!(report.clean());
        assert!(stack.fully_removed());
    }

    #[tokio::test]
    async fn test_stop_failure_does_not_block_the_rest() {
        let runtime = MockRuntime::new();
        runtime.fail_stop("gantry-test0001-rm");
        let mut stack = running_stack();

        let report = stack.sweep(&runtime, Duration::from_secs(10)).await;

        assert_eq!(report.stopped, 2);
        // Force-remove still reaps the container that refused to stop
        assert_eq!(report.removed, 3);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].action, "stop");
        assert!(!report.clean());
        assert!(stack.fully_removed());
    }

    #[tokio::test]
    async fn test_remove_failure_keeps_the_handle_for_a_later_sweep() {
        let runtime = MockRuntime::new();
        runtime.fail_remove("gantry-test0001-zk");
        let mut stack = running_stack();

        let report = stack.sweep(&runtime, Duration::from_secs(10)).await;
        assert_eq!(report.stopped, 3);
        assert_eq!(report.removed, 2);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].action, "remove");
        assert!(!stack.fully_removed());

        runtime.clear_failures();
        let report = stack.sweep(&runtime, Duration::from_secs(10)).await;
        assert!(report.clean());
        assert_eq!(report.removed, 1);
        assert!(stack.fully_removed());
    }

    #[tokio::test]
    async fn test_network_failure_is_reported_and_retried_next_sweep() {
        let runtime = MockRuntime::new();
        runtime.fail_network_rm();
        let mut stack = running_stack();

        let report = stack.sweep(&runtime, Duration::from_secs(10)).await;
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].action, "network-rm");
        assert!(!stack.fully_removed());

        // Once the runtime recovers the network goes too
        runtime.clear_failures();
        let report = stack.sweep(&runtime, Duration::from_secs(10)).await;
        assert!(report.clean());
        assert!(stack.fully_removed());
    }

    #[tokio::test]
    async fn test_register_existing_assumes_running() {
        let run = RunId::parse("gantry-test0002").unwrap();
        let mut stack = CleanupStack::new(run.clone());
        stack.register_existing("zk", &run.container_name("zk"));

        assert_eq!(stack.handles()[0].status(), ContainerStatus::Running);

        let runtime = MockRuntime::new();
        let report = stack.sweep(&runtime, Duration::from_secs(10)).await;
        assert_eq!(report.stopped, 1);
        assert_eq!(report.removed, 1);
    }

    #[test]
    fn test_report_display() {
        let mut report = TeardownReport {
            stopped: 2,
            removed: 3,
            not_found: 1,
            issues: vec![],
        };
        assert_eq!(report.to_string(), "stopped 2, removed 3 container(s), 1 already gone");

        report.issues.push(TeardownIssue {
            container: "c".into(),
            action: "stop",
            message: "boom".into(),
        });
        assert!(report.to_string().ends_with("1 issue(s)"));
    }
}
