//! Gantry Core
//!
//! Core domain types for the gantry integration-test orchestrator.
//!
//! This crate contains:
//! - Topology types: the declared service set, its manifest form and validation
//! - Dependency graph: deterministic launch ordering over declared edges
//! - Container handles: run-scoped resource tracking with monotonic status
//! - Run types: run identifiers, results and the pipeline state machine

pub mod graph;
pub mod handle;
pub mod run;
pub mod topology;
