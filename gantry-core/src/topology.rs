//! Topology manifest types
//!
//! A topology declares the services under test (their build contexts,
//! dependency edges and network aliases) plus the test-runner workload that
//! drives them. Manifests are plain JSON, loaded once and never mutated.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::graph;

/// Errors raised while loading or validating a topology manifest
#[derive(Debug, Error)]
pub enum TopologyError {
    /// The manifest file could not be read
    #[error("failed to read manifest {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The manifest is not valid JSON for the expected shape
    #[error("failed to parse manifest: {0}")]
    Parse(#[from] serde_json::Error),

    /// The manifest declares no services at all
    #[error("topology declares no services")]
    NoServices,

    /// A name is unusable as a container name component
    #[error(
        "invalid service name '{0}': names start with an alphanumeric character and contain only [A-Za-z0-9_.-]"
    )]
    InvalidName(String),

    /// Two services (or a service and the test runner) share a name
    #[error("duplicate service name '{0}'")]
    DuplicateName(String),

    /// A dependency edge points at a name that is not a declared service
    #[error("service '{service}' depends on undeclared service '{dependency}'")]
    UnknownDependency { service: String, dependency: String },

    /// A service lists itself as a dependency
    #[error("service '{0}' depends on itself")]
    SelfDependency(String),

    /// The declared edges contain a cycle
    #[error("dependency cycle involving: {0}")]
    DependencyCycle(String),

    /// The test runner declared dependencies; it always runs last
    #[error("test runner '{0}' must not declare dependencies: it runs after the full topology")]
    TestRunnerDependencies(String),
}

/// A readiness probe run against a started service before its dependents launch
///
/// Services without a probe keep the original behavior: started counts as
/// ready the moment the start call returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReadinessProbe {
    /// Run a command inside the container; ready when it exits 0
    Command { argv: Vec<String> },
    /// Fetch a URL from the host; ready on a 2xx status (needs a published port)
    Http { url: String },
}

/// A single named service in the test topology
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Service name, also the default network alias
    pub name: String,

    /// Directory holding the image build context
    pub build_context: PathBuf,

    /// Image repository builds are tagged under (default: `gantry/<name>`)
    #[serde(default)]
    pub image: Option<String>,

    /// Hostname dependents use to reach this service (default: the name)
    #[serde(default)]
    pub alias: Option<String>,

    /// Services that must be started and ready before this one launches
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Environment variables passed to the container
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Port mappings in the runtime's publish syntax ("host:container")
    #[serde(default)]
    pub ports: Vec<String>,

    /// Command override for the container
    #[serde(default)]
    pub command: Option<Vec<String>>,

    /// Optional readiness probe
    #[serde(default)]
    pub readiness: Option<ReadinessProbe>,
}

impl ServiceSpec {
    /// Creates a spec with only the required fields set
    pub fn new(name: impl Into<String>, build_context: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            build_context: build_context.into(),
            image: None,
            alias: None,
            depends_on: Vec::new(),
            env: HashMap::new(),
            ports: Vec::new(),
            command: None,
            readiness: None,
        }
    }

    /// Adds a dependency edge
    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }

    /// Sets the readiness probe
    pub fn with_readiness(mut self, probe: ReadinessProbe) -> Self {
        self.readiness = Some(probe);
        self
    }

    /// Image repository builds of this service are tagged under
    ///
    /// The derived repo is lowercased: registries reject uppercase
    /// repository names, while service names allow them.
    pub fn image_repo(&self) -> String {
        self.image
            .clone()
            .unwrap_or_else(|| format!("gantry/{}", self.name.to_lowercase()))
    }

    /// Hostname dependents resolve this service by inside the run network
    pub fn link_alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// The full declared topology: services under test plus the test runner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topology {
    /// Topology name, used for logging only
    #[serde(default = "default_topology_name")]
    pub name: String,

    /// Services started in dependency order before the test run
    pub services: Vec<ServiceSpec>,

    /// Workload run in the foreground against the started topology
    pub test_runner: ServiceSpec,
}

fn default_topology_name() -> String {
    "itest".to_string()
}

impl Topology {
    /// Parses and validates a manifest from JSON text
    pub fn from_json(text: &str) -> Result<Self, TopologyError> {
        let topology: Topology = serde_json::from_str(text)?;
        topology.validate()?;
        Ok(topology)
    }

    /// Loads and validates a manifest file
    pub fn from_json_file(path: &Path) -> Result<Self, TopologyError> {
        let text = std::fs::read_to_string(path).map_err(|source| TopologyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Checks the declared topology is well formed
    ///
    /// Rejects empty topologies, unusable or duplicate names, dependency
    /// edges that do not resolve, cycles, and a test runner with declared
    /// dependencies (it always runs after the full topology).
    pub fn validate(&self) -> Result<(), TopologyError> {
        if self.services.is_empty() {
            return Err(TopologyError::NoServices);
        }

        let mut seen = HashSet::new();
        for spec in self.services.iter().chain(std::iter::once(&self.test_runner)) {
            if !valid_name(&spec.name) {
                return Err(TopologyError::InvalidName(spec.name.clone()));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(TopologyError::DuplicateName(spec.name.clone()));
            }
        }

        if !self.test_runner.depends_on.is_empty() {
            return Err(TopologyError::TestRunnerDependencies(
                self.test_runner.name.clone(),
            ));
        }

        // Resolves edges and rejects cycles; the order itself is discarded
        graph::launch_order(&self.services)?;
        Ok(())
    }

    /// Every spec that gets an image built: services first, test runner last
    pub fn build_set(&self) -> impl Iterator<Item = &ServiceSpec> {
        self.services.iter().chain(std::iter::once(&self.test_runner))
    }
}

/// Names must be usable as a container-name component
fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}
