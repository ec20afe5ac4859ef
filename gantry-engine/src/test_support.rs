//! Scriptable in-memory container runtime for tests
//!
//! Records every operation in order and lets tests inject failures per
//! resource name (substring match), script exec exit codes, and control the
//! foreground test process.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use crate::docker::{ContainerRuntime, Result, RunOptions, RuntimeError};

pub(crate) struct MockRuntime {
    log: Mutex<Vec<String>>,
    fail_builds: Mutex<HashSet<String>>,
    fail_starts: Mutex<HashSet<String>>,
    fail_stops: Mutex<HashSet<String>>,
    fail_removes: Mutex<HashSet<String>>,
    missing: Mutex<HashSet<String>>,
    fail_network: Mutex<bool>,
    exec_codes: Mutex<HashMap<String, VecDeque<i32>>>,
    foreground_code: Mutex<i32>,
    foreground_times_out: Mutex<bool>,
    next_id: Mutex<u64>,
}

impl MockRuntime {
    pub(crate) fn new() -> Self {
        Self {
            log: Mutex::new(Vec::new()),
            fail_builds: Mutex::new(HashSet::new()),
            fail_starts: Mutex::new(HashSet::new()),
            fail_stops: Mutex::new(HashSet::new()),
            fail_removes: Mutex::new(HashSet::new()),
            missing: Mutex::new(HashSet::new()),
            fail_network: Mutex::new(false),
            exec_codes: Mutex::new(HashMap::new()),
            foreground_code: Mutex::new(0),
            foreground_times_out: Mutex::new(false),
            next_id: Mutex::new(0),
        }
    }

    /// Makes builds fail for tags containing the needle
    pub(crate) fn fail_build(&self, needle: &str) {
        self.fail_builds.lock().unwrap().insert(needle.to_string());
    }

    /// Makes detached starts fail for names containing the needle
    ///
    /// A failed start leaves no container behind, so later stop and remove
    /// calls on the same name report not-found.
    pub(crate) fn fail_start(&self, needle: &str) {
        self.fail_starts.lock().unwrap().insert(needle.to_string());
        self.missing.lock().unwrap().insert(needle.to_string());
    }

    /// Makes stops fail (daemon error) for names containing the needle
    pub(crate) fn fail_stop(&self, needle: &str) {
        self.fail_stops.lock().unwrap().insert(needle.to_string());
    }

    /// Makes removes fail (daemon error) for names containing the needle
    pub(crate) fn fail_remove(&self, needle: &str) {
        self.fail_removes.lock().unwrap().insert(needle.to_string());
    }

    /// Marks resources as already gone: stop/remove report not-found
    pub(crate) fn mark_missing(&self, needle: &str) {
        self.missing.lock().unwrap().insert(needle.to_string());
    }

    /// Makes network removal fail with a daemon error
    pub(crate) fn fail_network_rm(&self) {
        *self.fail_network.lock().unwrap() = true;
    }

    /// Clears all injected failures (missing resources stay missing)
    pub(crate) fn clear_failures(&self) {
        self.fail_builds.lock().unwrap().clear();
        self.fail_starts.lock().unwrap().clear();
        self.fail_stops.lock().unwrap().clear();
        self.fail_removes.lock().unwrap().clear();
        *self.fail_network.lock().unwrap() = false;
    }

    /// Scripts exec exit codes for a container; the last code repeats
    pub(crate) fn script_exec(&self, container: &str, codes: impl IntoIterator<Item = i32>) {
        self.exec_codes
            .lock()
            .unwrap()
            .insert(container.to_string(), codes.into_iter().collect());
    }

    /// Sets the exit code the foreground test process reports
    pub(crate) fn set_foreground_code(&self, code: i32) {
        *self.foreground_code.lock().unwrap() = code;
    }

    /// Makes the foreground test process hit its timeout
    pub(crate) fn time_out_foreground(&self) {
        *self.foreground_times_out.lock().unwrap() = true;
    }

    pub(crate) fn log_snapshot(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub(crate) fn count_ops(&self, prefix: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.starts_with(prefix))
            .count()
    }

    fn log(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }

    fn matched(&self, set: &Mutex<HashSet<String>>, name: &str) -> bool {
        set.lock()
            .unwrap()
            .iter()
            .any(|needle| name.contains(needle.as_str()))
    }

    fn daemon_error(command: String) -> RuntimeError {
        RuntimeError::CommandFailed {
            command,
            code: 1,
            stderr: "Cannot connect to the Docker daemon at unix:///var/run/docker.sock"
                .to_string(),
        }
    }

    fn not_found_container(name: &str) -> RuntimeError {
        RuntimeError::CommandFailed {
            command: format!("docker rm -f {name}"),
            code: 1,
            stderr: format!("Error response from daemon: No such container: {name}"),
        }
    }

    fn not_found_network(name: &str) -> RuntimeError {
        RuntimeError::CommandFailed {
            command: format!("docker network rm {name}"),
            code: 1,
            stderr: format!("Error response from daemon: network {name} not found"),
        }
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn build_image(&self, tag: &str, _context: &Path) -> Result<()> {
        self.log(format!("build {tag}"));
        if self.matched(&self.fail_builds, tag) {
            return Err(Self::daemon_error(format!("docker build -t {tag}")));
        }
        Ok(())
    }

    async fn create_network(&self, name: &str) -> Result<()> {
        self.log(format!("network-create {name}"));
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        self.log(format!("network-rm {name}"));
        if *self.fail_network.lock().unwrap() {
            return Err(Self::daemon_error(format!("docker network rm {name}")));
        }
        if self.matched(&self.missing, name) {
            return Err(Self::not_found_network(name));
        }
        Ok(())
    }

    async fn run_detached(&self, opts: &RunOptions) -> Result<String> {
        self.log(format!("run {}", opts.name));
        if self.matched(&self.fail_starts, &opts.name) {
            return Err(Self::daemon_error(format!(
                "docker run -d --name {}",
                opts.name
            )));
        }
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        Ok(format!("mock-{:08x}", *next))
    }

    async fn run_foreground(&self, opts: &RunOptions, timeout: Option<Duration>) -> Result<i32> {
        self.log(format!("test {}", opts.name));
        if *self.foreground_times_out.lock().unwrap() {
            return Err(RuntimeError::Timeout {
                command: format!("docker run --rm --name {}", opts.name),
                timeout: timeout.unwrap_or(Duration::ZERO),
            });
        }
        Ok(*self.foreground_code.lock().unwrap())
    }

    async fn exec(&self, container: &str, _argv: &[String]) -> Result<i32> {
        self.log(format!("exec {container}"));
        let mut scripts = self.exec_codes.lock().unwrap();
        if let Some(queue) = scripts.get_mut(container) {
            let code = if queue.len() > 1 {
                queue.pop_front().unwrap_or(0)
            } else {
                queue.front().copied().unwrap_or(0)
            };
            return Ok(code);
        }
        Ok(0)
    }

    async fn stop(&self, container: &str, _grace: Duration) -> Result<()> {
        self.log(format!("stop {container}"));
        if self.matched(&self.fail_stops, container) {
            return Err(Self::daemon_error(format!("docker stop {container}")));
        }
        if self.matched(&self.missing, container) {
            return Err(Self::not_found_container(container));
        }
        Ok(())
    }

    async fn remove(&self, container: &str) -> Result<()> {
        self.log(format!("rm {container}"));
        if self.matched(&self.fail_removes, container) {
            return Err(Self::daemon_error(format!("docker rm -f {container}")));
        }
        if self.matched(&self.missing, container) {
            return Err(Self::not_found_container(container));
        }
        Ok(())
    }
}
