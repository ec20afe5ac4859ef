//! Container runtime access
//!
//! The [`ContainerRuntime`] trait is the engine's only seam to the outside
//! world. [`DockerCli`] implements it by shelling out to the docker binary
//! (or any CLI-compatible runtime such as podman), one subprocess per
//! operation, every call bounded by a timeout.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::EngineConfig;

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors from container runtime operations
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The runtime binary could not be spawned or waited on
    #[error("failed to run '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The runtime command ran but exited non-zero
    #[error("'{command}' exited with code {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    /// The runtime command exceeded its timeout
    #[error("'{command}' timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
}

impl RuntimeError {
    /// Whether the failure means the resource is already gone
    ///
    /// Teardown treats these as success: the goal is absence, and absence
    /// found is absence achieved.
    pub fn is_not_found(&self) -> bool {
        match self {
            RuntimeError::CommandFailed { stderr, .. } => {
                let lower = stderr.to_lowercase();
                lower.contains("no such container")
                    || lower.contains("no such network")
                    || lower.contains("not found")
            }
            _ => false,
        }
    }
}

/// Options for starting one container
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Run-scoped container name
    pub name: String,

    /// Image tag to run
    pub image: String,

    /// Network to attach to
    pub network: String,

    /// Alias other containers on the network resolve this one by
    pub alias: String,

    /// Environment variables
    pub env: HashMap<String, String>,

    /// Port mappings in the runtime's publish syntax
    pub ports: Vec<String>,

    /// Command override
    pub command: Option<Vec<String>>,
}

/// The engine's seam to the container runtime
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Builds an image from a context directory and tags it
    async fn build_image(&self, tag: &str, context: &Path) -> Result<()>;

    /// Creates the run-scoped bridge network
    async fn create_network(&self, name: &str) -> Result<()>;

    /// Removes the run-scoped network
    async fn remove_network(&self, name: &str) -> Result<()>;

    /// Starts a container in the background, returning the runtime id
    async fn run_detached(&self, opts: &RunOptions) -> Result<String>;

    /// Runs a container in the foreground and returns its exit code
    ///
    /// Stdio is inherited so test output streams to the caller's terminal.
    async fn run_foreground(&self, opts: &RunOptions, timeout: Option<Duration>) -> Result<i32>;

    /// Runs a command inside a container, returning its exit code
    async fn exec(&self, container: &str, argv: &[String]) -> Result<i32>;

    /// Stops a container, giving it a grace period before the kill
    async fn stop(&self, container: &str, grace: Duration) -> Result<()>;

    /// Force-removes a container
    async fn remove(&self, container: &str) -> Result<()>;
}

/// [`ContainerRuntime`] backed by the docker CLI
pub struct DockerCli {
    bin: String,
    build_timeout: Duration,
    start_timeout: Duration,
}

impl DockerCli {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            bin: config.runtime_bin.clone(),
            build_timeout: config.build_timeout,
            start_timeout: config.start_timeout,
        }
    }

    /// Checks the runtime binary answers at all
    pub async fn check_available(&self) -> Result<()> {
        self.run_checked(&["--version".to_string()], self.start_timeout)
            .await
            .map(|_| ())
    }

    /// Runs a runtime command to completion, capturing output
    ///
    /// Fails on spawn errors, non-zero exit and timeout. On timeout the
    /// dropped child is killed via kill_on_drop.
    async fn run_checked(&self, args: &[String], timeout: Duration) -> Result<String> {
        let command_line = format!("{} {}", self.bin, args.join(" "));
        debug!(command = %command_line, "running runtime command");

        let child = Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RuntimeError::Spawn {
                command: command_line.clone(),
                source,
            })?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| RuntimeError::Timeout {
                command: command_line.clone(),
                timeout,
            })?
            .map_err(|source| RuntimeError::Spawn {
                command: command_line.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            return Err(RuntimeError::CommandFailed {
                command: command_line,
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        if !stderr.is_empty() {
            debug!(command = %command_line, stderr = %stderr, "runtime command wrote to stderr");
        }
        Ok(stdout)
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn build_image(&self, tag: &str, context: &Path) -> Result<()> {
        self.run_checked(&build_args(tag, context), self.build_timeout)
            .await
            .map(|_| ())
    }

    async fn create_network(&self, name: &str) -> Result<()> {
        self.run_checked(&network_create_args(name), self.start_timeout)
            .await
            .map(|_| ())
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        self.run_checked(&network_rm_args(name), self.start_timeout)
            .await
            .map(|_| ())
    }

    async fn run_detached(&self, opts: &RunOptions) -> Result<String> {
        self.run_checked(&run_args(opts, true), self.start_timeout)
            .await
    }

    async fn run_foreground(&self, opts: &RunOptions, timeout: Option<Duration>) -> Result<i32> {
        let args = run_args(opts, false);
        let command_line = format!("{} {}", self.bin, args.join(" "));
        info!(container = %opts.name, "running foreground container");

        let mut child = Command::new(&self.bin)
            .args(&args)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RuntimeError::Spawn {
                command: command_line.clone(),
                source,
            })?;

        let status = match timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(waited) => waited,
                Err(_) => {
                    // Kills the CLI client; the container itself is left for
                    // the teardown sweep to stop and remove
                    let _ = child.kill().await;
                    return Err(RuntimeError::Timeout {
                        command: command_line,
                        timeout: limit,
                    });
                }
            },
            None => child.wait().await,
        }
        .map_err(|source| RuntimeError::Spawn {
            command: command_line,
            source,
        })?;

        Ok(status.code().unwrap_or(1))
    }

    async fn exec(&self, container: &str, argv: &[String]) -> Result<i32> {
        let args = exec_args(container, argv);
        let command_line = format!("{} {}", self.bin, args.join(" "));
        debug!(command = %command_line, "running exec probe");

        let child = Command::new(&self.bin)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RuntimeError::Spawn {
                command: command_line.clone(),
                source,
            })?;

        let output = tokio::time::timeout(self.start_timeout, child.wait_with_output())
            .await
            .map_err(|_| RuntimeError::Timeout {
                command: command_line.clone(),
                timeout: self.start_timeout,
            })?
            .map_err(|source| RuntimeError::Spawn {
                command: command_line,
                source,
            })?;

        // Non-zero is a probe answer, not an error
        Ok(output.status.code().unwrap_or(1))
    }

    async fn stop(&self, container: &str, grace: Duration) -> Result<()> {
        // The CLI call gets the grace period plus a buffer for the kill
        let timeout = grace + Duration::from_secs(30);
        self.run_checked(&stop_args(container, grace), timeout)
            .await
            .map(|_| ())
    }

    async fn remove(&self, container: &str) -> Result<()> {
        self.run_checked(&rm_args(container), self.start_timeout)
            .await
            .map(|_| ())
    }
}

fn build_args(tag: &str, context: &Path) -> Vec<String> {
    vec![
        "build".to_string(),
        "-t".to_string(),
        tag.to_string(),
        context.display().to_string(),
    ]
}

fn run_args(opts: &RunOptions, detached: bool) -> Vec<String> {
    let mut args = vec!["run".to_string()];
    if detached {
        args.push("-d".to_string());
    } else {
        args.push("--rm".to_string());
    }
    args.push("--name".to_string());
    args.push(opts.name.clone());
    args.push("--network".to_string());
    args.push(opts.network.clone());
    args.push("--network-alias".to_string());
    args.push(opts.alias.clone());

    // Sorted so the command line is stable across runs
    let mut env: Vec<(&String, &String)> = opts.env.iter().collect();
    env.sort();
    for (key, value) in env {
        args.push("-e".to_string());
        args.push(format!("{key}={value}"));
    }

    for port in &opts.ports {
        args.push("-p".to_string());
        args.push(port.clone());
    }

    args.push(opts.image.clone());
    if let Some(command) = &opts.command {
        args.extend(command.iter().cloned());
    }
    args
}

fn exec_args(container: &str, argv: &[String]) -> Vec<String> {
    let mut args = vec!["exec".to_string(), container.to_string()];
    args.extend(argv.iter().cloned());
    args
}

fn stop_args(container: &str, grace: Duration) -> Vec<String> {
    vec![
        "stop".to_string(),
        "-t".to_string(),
        grace.as_secs().to_string(),
        container.to_string(),
    ]
}

fn rm_args(container: &str) -> Vec<String> {
    vec!["rm".to_string(), "-f".to_string(), container.to_string()]
}

fn network_create_args(name: &str) -> Vec<String> {
    vec!["network".to_string(), "create".to_string(), name.to_string()]
}

fn network_rm_args(name: &str) -> Vec<String> {
    vec!["network".to_string(), "rm".to_string(), name.to_string()]
}
