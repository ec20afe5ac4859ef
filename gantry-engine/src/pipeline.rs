//! Pipeline orchestration
//!
//! One [`Pipeline`] value owns one run: build every image, create the run
//! network, launch services in dependency order, run the test workload in
//! the foreground, and always sweep everything at the end. Teardown runs on
//! every path out, including setup failures and ctrl-c.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use gantry_core::handle::{ContainerHandle, ContainerStatus};
use gantry_core::run::{
    EXIT_INTERRUPTED, EXIT_SETUP_FAILURE, EXIT_TEST_TIMEOUT, PipelineState, RunId, RunResult,
};
use gantry_core::topology::{ServiceSpec, Topology, TopologyError};

use crate::cleanup::{CleanupStack, TeardownReport};
use crate::config::EngineConfig;
use crate::docker::{ContainerRuntime, RunOptions, RuntimeError};
use crate::readiness;

/// Fatal pipeline errors: the topology never reached a usable state
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to build image for '{service}': {source}")]
    Build {
        service: String,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to create network '{name}': {source}")]
    Network {
        name: String,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to launch '{service}': {source}")]
    Launch {
        service: String,
        #[source]
        source: RuntimeError,
    },

    #[error("service '{service}' did not become ready within {timeout:?}")]
    NotReady { service: String, timeout: Duration },

    #[error("cannot order topology: {source}")]
    Order {
        #[from]
        source: TopologyError,
    },
}

/// How the run ended
#[derive(Debug)]
pub enum PipelineOutcome {
    /// Tests ran and passed
    Passed,

    /// Tests ran and failed; the exit code is the test process's, verbatim
    TestFailed { exit_code: i32 },

    /// Build or launch failed; the tests never ran
    SetupFailed { error: PipelineError },

    /// A ctrl-c arrived before the tests finished
    Interrupted,
}

impl PipelineOutcome {
    /// Process exit code for this outcome
    ///
    /// Test failures keep their own code so callers can distinguish "the
    /// tests found a bug" from "the harness broke".
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineOutcome::Passed => 0,
            PipelineOutcome::TestFailed { exit_code } => *exit_code,
            PipelineOutcome::SetupFailed { .. } => EXIT_SETUP_FAILURE,
            PipelineOutcome::Interrupted => EXIT_INTERRUPTED,
        }
    }
}

/// Everything a finished run can tell the caller
#[derive(Debug)]
pub struct PipelineReport {
    pub run_id: RunId,
    pub state: PipelineState,
    pub outcome: PipelineOutcome,
    pub teardown: TeardownReport,
    pub handles: Vec<ContainerHandle>,
}

/// A single integration-test run against a container runtime
pub struct Pipeline {
    runtime: Arc<dyn ContainerRuntime>,
    config: EngineConfig,
    topology: Topology,
    http: reqwest::Client,
    run: RunId,
    state: PipelineState,
    stack: CleanupStack,
    result: Option<RunResult>,
}

impl Pipeline {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: EngineConfig, topology: Topology) -> Self {
        Self::with_run_id(runtime, config, topology, RunId::generate())
    }

    pub fn with_run_id(
        runtime: Arc<dyn ContainerRuntime>,
        config: EngineConfig,
        topology: Topology,
        run: RunId,
    ) -> Self {
        Self {
            runtime,
            config,
            topology,
            http: reqwest::Client::new(),
            stack: CleanupStack::new(run.clone()),
            run,
            state: PipelineState::Init,
            result: None,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn handles(&self) -> &[ContainerHandle] {
        self.stack.handles()
    }

    /// Exit code of the finished test run, if it got that far
    pub fn result(&self) -> Option<RunResult> {
        self.result
    }

    fn enter(&mut self, state: PipelineState) {
        debug!(run = %self.run, from = %self.state, to = %state, "pipeline state change");
        self.state = state;
    }

    /// Builds every image in the manifest, test runner included
    ///
    /// Tags are run-scoped, so concurrent runs never clobber each other;
    /// layer caching keeps repeated builds cheap.
    pub async fn build_images(&mut self) -> Result<(), PipelineError> {
        self.enter(PipelineState::Building);

        for spec in self.topology.build_set() {
            let tag = self.run.image_tag(&spec.image_repo());
            info!(service = %spec.name, %tag, "building image");
            self.runtime
                .build_image(&tag, &spec.build_context)
                .await
                .map_err(|source| PipelineError::Build {
                    service: spec.name.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Creates the run network and starts services in dependency order
    ///
    /// Each service is registered for cleanup before its start call, so a
    /// start that fails halfway still gets swept.
    pub async fn launch_topology(&mut self) -> Result<(), PipelineError> {
        self.enter(PipelineState::Launching);

        let network = self.run.network_name();
        self.stack.register_network(&network);
        self.runtime
            .create_network(&network)
            .await
            .map_err(|source| PipelineError::Network {
                name: network.clone(),
                source,
            })?;

        let order: Vec<ServiceSpec> = gantry_core::graph::launch_order(&self.topology.services)?
            .into_iter()
            .cloned()
            .collect();

        for spec in &order {
            self.launch_service(spec).await?;
        }
        Ok(())
    }

    async fn launch_service(&mut self, spec: &ServiceSpec) -> Result<(), PipelineError> {
        let name = self.run.container_name(&spec.name);
        let opts = RunOptions {
            name: name.clone(),
            image: self.run.image_tag(&spec.image_repo()),
            network: self.run.network_name(),
            alias: spec.link_alias().to_string(),
            env: spec.env.clone(),
            ports: spec.ports.clone(),
            command: spec.command.clone(),
        };

        self.stack.register(&spec.name, &name);
        info!(service = %spec.name, container = %name, "starting service");

        let id = self
            .runtime
            .run_detached(&opts)
            .await
            .map_err(|source| PipelineError::Launch {
                service: spec.name.clone(),
                source,
            })?;
        self.stack.set_runtime_id(&name, id);
        self.stack.advance(&name, ContainerStatus::Running);

        if let Some(probe) = &spec.readiness {
            let waited = readiness::wait_ready(
                self.runtime.as_ref(),
                &self.http,
                &name,
                probe,
                self.config.ready_timeout,
                self.config.ready_interval,
            )
            .await
            .map_err(|_| PipelineError::NotReady {
                service: spec.name.clone(),
                timeout: self.config.ready_timeout,
            })?;
            info!(service = %spec.name, "ready after {:.1}s", waited.as_secs_f64());
        }
        Ok(())
    }

    /// Runs the test workload in the foreground and captures its exit code
    ///
    /// A timed-out run maps to exit code 124 and leaves the runner container
    /// tracked as running: killing the CLI client does not kill the
    /// container, so the sweep has to.
    pub async fn run_test(&mut self) -> Result<RunResult, PipelineError> {
        self.enter(PipelineState::Testing);

        let spec = self.topology.test_runner.clone();
        let name = self.run.container_name(&spec.name);
        let opts = RunOptions {
            name: name.clone(),
            image: self.run.image_tag(&spec.image_repo()),
            network: self.run.network_name(),
            alias: spec.link_alias().to_string(),
            env: spec.env.clone(),
            ports: spec.ports.clone(),
            command: spec.command.clone(),
        };

        self.stack.register(&spec.name, &name);
        self.stack.advance(&name, ContainerStatus::Running);
        info!(container = %name, "running tests");

        let code = match self
            .runtime
            .run_foreground(&opts, self.config.test_timeout)
            .await
        {
            Ok(code) => {
                // Foreground runs use --rm; the sweep's rm -f mops up if the
                // runtime failed to
                self.stack.advance(&name, ContainerStatus::Stopped);
                code
            }
            Err(RuntimeError::Timeout { timeout, .. }) => {
                warn!(container = %name, ?timeout, "test run timed out");
                EXIT_TEST_TIMEOUT
            }
            Err(source) => {
                return Err(PipelineError::Launch {
                    service: spec.name.clone(),
                    source,
                });
            }
        };

        let result = RunResult::new(code);
        self.result = Some(result);
        Ok(result)
    }

    /// Sweeps every registered resource; failures are reported, never raised
    pub async fn teardown(&mut self) -> TeardownReport {
        self.enter(PipelineState::Teardown);
        self.stack
            .sweep(self.runtime.as_ref(), self.config.stop_grace)
            .await
    }

    /// Runs the whole pipeline: build, launch, test, always teardown
    ///
    /// Ctrl-c interrupts whichever phase is active; teardown still runs.
    pub async fn execute(mut self) -> PipelineReport {
        let run = self.run.clone();
        let outcome = tokio::select! {
            result = async {
                self.build_images().await?;
                self.launch_topology().await?;
                self.run_test().await
            } => match result {
                Ok(tests) if tests.passed() => PipelineOutcome::Passed,
                Ok(tests) => PipelineOutcome::TestFailed {
                    exit_code: tests.exit_code,
                },
                Err(error) => PipelineOutcome::SetupFailed { error },
            },
            _ = tokio::signal::ctrl_c() => {
                warn!(run = %run, "interrupted, tearing down");
                PipelineOutcome::Interrupted
            }
        };

        let teardown = self.teardown().await;
        if !teardown.clean() {
            warn!(run = %self.run, %teardown, "teardown finished with issues");
        }

        let state = if outcome.exit_code() == 0 {
            PipelineState::Done
        } else {
            PipelineState::Failed
        };
        self.enter(state);

        PipelineReport {
            run_id: self.run.clone(),
            state,
            outcome,
            teardown,
            handles: self.stack.snapshot(),
        }
    }
}

/// Sweeps a previous run's resources by re-deriving its names
///
/// The manifest plus the run id are enough to name everything that run
/// could have created, so a crashed or kill -9'd pipeline can be cleaned
/// up without any state file.
pub async fn teardown_run(
    runtime: Arc<dyn ContainerRuntime>,
    topology: &Topology,
    config: &EngineConfig,
    run: RunId,
) -> TeardownReport {
    let mut stack = CleanupStack::new(run.clone());
    stack.register_network(run.network_name());
    for spec in topology.build_set() {
        stack.register_existing(&spec.name, &run.container_name(&spec.name));
    }
    stack.sweep(runtime.as_ref(), config.stop_grace).await
}
