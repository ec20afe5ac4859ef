//! Readiness probes
//!
//! A started container is not necessarily ready to serve its dependents.
//! Services with a declared probe are polled until the probe passes or the
//! ready timeout expires; only then do their dependents launch.

use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use gantry_core::topology::ReadinessProbe;

use crate::docker::{ContainerRuntime, Result, RuntimeError};

/// Probe intervals double per failed attempt up to this multiple of the base
const MAX_INTERVAL_MULTIPLIER: u32 = 8;

fn next_delay(current: Duration, base: Duration) -> Duration {
    (current * 2).min(base * MAX_INTERVAL_MULTIPLIER)
}

/// Runs the probe once; any error counts as not ready yet
async fn probe_once(
    runtime: &dyn ContainerRuntime,
    http: &reqwest::Client,
    container: &str,
    probe: &ReadinessProbe,
) -> bool {
    match probe {
        ReadinessProbe::Command { argv } => match runtime.exec(container, argv).await {
            Ok(code) => code == 0,
            Err(err) => {
                debug!(container, error = %err, "readiness exec failed");
                false
            }
        },
        ReadinessProbe::Http { url } => match http.get(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!(container, error = %err, "readiness request failed");
                false
            }
        },
    }
}

/// Polls the probe until it passes, returning the time waited
///
/// Intervals back off by doubling from `interval`. Fails with a timeout
/// error once `timeout` has elapsed without a passing probe.
pub async fn wait_ready(
    runtime: &dyn ContainerRuntime,
    http: &reqwest::Client,
    container: &str,
    probe: &ReadinessProbe,
    timeout: Duration,
    interval: Duration,
) -> Result<Duration> {
    let started = Instant::now();
    let deadline = started + timeout;
    let mut delay = interval;
    let mut attempt = 0u32;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        attempt += 1;

        let ready = tokio::time::timeout(remaining, probe_once(runtime, http, container, probe))
            .await
            .unwrap_or(false);
        if ready {
            debug!(container, attempt, "readiness probe passed");
            return Ok(started.elapsed());
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        tokio::time::sleep(delay.min(remaining)).await;
        delay = next_delay(delay, interval);
    }

    Err(RuntimeError::Timeout {
        command: format!("readiness probe for {container}"),
        timeout,
    })
}
