//! Polling gate that waits for the daemon API to answer.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep_until, timeout_at};
use tracing::{debug, info};

use orion_config::Multiaddr;

use crate::api::NodeApi;
use crate::process::DaemonHandle;

const READINESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::readiness");

/// Budget and cadence for one readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Total time allowed before the wait fails.
    pub timeout: Duration,
    /// Pause between probes.
    pub interval: Duration,
}

impl ReadinessPolicy {
    /// Builds a policy from millisecond values.
    #[must_use]
    pub const fn from_millis(timeout_ms: u64, interval_ms: u64) -> Self {
        Self {
            timeout: Duration::from_millis(timeout_ms),
            interval: Duration::from_millis(interval_ms),
        }
    }
}

/// Errors raised while waiting for the API.
#[derive(Debug, Error)]
pub enum ReadinessError {
    /// The API never answered within the budget.
    #[error(
        "timed out after {timeout_ms} ms waiting for the daemon API at {address}{}",
        last_error_suffix(.last_error.as_deref())
    )]
    ApiTimeout {
        /// API multiaddr that was polled.
        address: String,
        /// Budget that was exhausted.
        timeout_ms: u64,
        /// Last probe failure, if any probe completed.
        last_error: Option<String>,
    },
    /// The daemon process exited while the gate was waiting.
    #[error("daemon exited before its API became ready ({status})")]
    DaemonExited {
        /// Exit status reported by the child.
        status: ExitStatus,
    },
    /// The daemon's state could not be queried.
    #[error("failed to query daemon process state: {source}")]
    ProcessState {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

fn last_error_suffix(last_error: Option<&str>) -> String {
    last_error
        .map(|error| format!(" (last error: {error})"))
        .unwrap_or_default()
}

/// Polls `api` until its identity endpoint answers or `policy.timeout`
/// elapses.
///
/// An owned daemon that exits mid-wait fails the gate at once rather than
/// letting the budget run out.
pub async fn await_ready(
    api: &dyn NodeApi,
    daemon: &mut DaemonHandle,
    policy: ReadinessPolicy,
    address: &Multiaddr,
) -> Result<(), ReadinessError> {
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let mut last_error = None;
    let mut attempts: u32 = 0;

    loop {
        if let Some(status) = daemon
            .exit_status()
            .map_err(|source| ReadinessError::ProcessState { source })?
        {
            return Err(ReadinessError::DaemonExited { status });
        }

        attempts = attempts.saturating_add(1);
        match timeout_at(deadline, api.identity()).await {
            Ok(Ok(())) => {
                info!(
                    target: READINESS_TARGET,
                    %address,
                    attempts,
                    elapsed_ms = started.elapsed().as_millis(),
                    "daemon API ready"
                );
                return Ok(());
            }
            Ok(Err(error)) => {
                debug!(target: READINESS_TARGET, %address, attempts, error = %error, "API not ready");
                last_error = Some(error.to_string());
            }
            Err(_) => break,
        }

        let next = Instant::now() + policy.interval;
        if next >= deadline {
            sleep_until(deadline).await;
            break;
        }
        sleep_until(next).await;
    }

    Err(ReadinessError::ApiTimeout {
        address: address.to_string(),
        timeout_ms: u64::try_from(policy.timeout.as_millis()).unwrap_or(u64::MAX),
        last_error,
    })
}
