//! Gantry Engine
//!
//! Drives a full integration-test run against a container runtime:
//!
//! - `docker`: the [`docker::ContainerRuntime`] seam and its docker CLI
//!   implementation
//! - `pipeline`: build images, launch the topology in dependency order, run
//!   the test workload, always tear down
//! - `readiness`: probes that gate dependent launches on started services
//! - `cleanup`: the cleanup stack that makes teardown run on every exit path
//! - `config`: engine tunables (timeouts, runtime binary) from the
//!   environment

pub mod cleanup;
pub mod config;
pub mod docker;
pub mod pipeline;
pub mod readiness;

#[cfg(test)]
pub(crate) mod test_support;
