use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use camino::Utf8PathBuf;
use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use orion_config::EndpointConfig;

use super::PROCESS_TARGET;

/// Grace period between the stop request and a forced kill.
const TERMINATE_GRACE: Duration = Duration::from_secs(10);

/// Launches and stops the daemon process.
#[async_trait]
pub trait Supervisor: Send + Sync {
    /// Starts the daemon described by `endpoints` and returns once the
    /// process exists. Readiness is checked separately.
    async fn spawn(&self, endpoints: &EndpointConfig) -> Result<DaemonHandle, SpawnError>;

    /// Stops an owned daemon. Best effort; repeated calls and foreign
    /// handles are no-ops.
    async fn terminate(&self, daemon: &mut DaemonHandle);
}

/// Errors raised while launching the daemon.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// The executable does not exist.
    #[error("daemon executable '{binary}' was not found")]
    BinaryNotFound {
        /// Executable that was looked up.
        binary: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The executable exists but could not be started.
    #[error("failed to launch daemon executable '{binary}': {source}")]
    Launch {
        /// Executable that was launched.
        binary: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The process exited before it could be supervised.
    #[error("daemon executable '{binary}' exited immediately ({status})")]
    ExitedEarly {
        /// Executable that was launched.
        binary: Utf8PathBuf,
        /// Exit status it reported.
        status: ExitStatus,
    },
    /// The runtime did not report a process identifier.
    #[error("daemon executable '{binary}' did not report a process id")]
    MissingPid {
        /// Executable that was launched.
        binary: Utf8PathBuf,
    },
}

/// The daemon this run is responsible for.
#[derive(Debug)]
pub enum DaemonHandle {
    /// A daemon this run launched and must stop on shutdown.
    Owned(OwnedDaemon),
    /// A daemon someone else runs; never signalled.
    Foreign,
}

/// Child process launched by this run.
#[derive(Debug)]
pub struct OwnedDaemon {
    pid: u32,
    child: Option<Child>,
}

impl OwnedDaemon {
    /// Records a daemon known only by pid, with no child to reap.
    #[must_use]
    pub const fn detached(pid: u32) -> Self {
        Self { pid, child: None }
    }

    pub(crate) const fn with_child(pid: u32, child: Child) -> Self {
        Self {
            pid,
            child: Some(child),
        }
    }

    /// Process identifier.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }
}

impl DaemonHandle {
    /// True when this run must stop the daemon on shutdown.
    #[must_use]
    pub const fn is_owned(&self) -> bool {
        matches!(self, Self::Owned(_))
    }

    /// Process identifier of an owned daemon.
    #[must_use]
    pub const fn pid(&self) -> Option<u32> {
        match self {
            Self::Owned(owned) => Some(owned.pid),
            Self::Foreign => None,
        }
    }

    /// Exit status if an owned child has already stopped.
    ///
    /// Foreign and detached daemons always report `None`.
    pub fn exit_status(&mut self) -> io::Result<Option<ExitStatus>> {
        match self {
            Self::Owned(OwnedDaemon {
                child: Some(child), ..
            }) => child.try_wait(),
            Self::Owned(_) | Self::Foreign => Ok(None),
        }
    }
}

/// [`Supervisor`] that runs `<binary> daemon` against the configured
/// repository.
#[derive(Debug, Default, Clone, Copy)]
pub struct IpfsSupervisor;

impl IpfsSupervisor {
    /// Builds a supervisor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Supervisor for IpfsSupervisor {
    async fn spawn(&self, endpoints: &EndpointConfig) -> Result<DaemonHandle, SpawnError> {
        let binary = endpoints.binary_path().to_path_buf();
        let mut command = Command::new(binary.as_std_path());
        command
            .arg("daemon")
            .env("IPFS_PATH", endpoints.repo_path().as_std_path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());

        let mut child = command.spawn().map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                SpawnError::BinaryNotFound {
                    binary: binary.clone(),
                    source,
                }
            } else {
                SpawnError::Launch {
                    binary: binary.clone(),
                    source,
                }
            }
        })?;
        let early_exit = child.try_wait().map_err(|source| SpawnError::Launch {
            binary: binary.clone(),
            source,
        })?;
        if let Some(status) = early_exit {
            return Err(SpawnError::ExitedEarly { binary, status });
        }
        let pid = child
            .id()
            .ok_or_else(|| SpawnError::MissingPid {
                binary: binary.clone(),
            })?;
        info!(
            target: PROCESS_TARGET,
            pid,
            binary = %binary,
            repo = %endpoints.repo_path(),
            api = %endpoints.api(),
            "daemon process launched"
        );
        Ok(DaemonHandle::Owned(OwnedDaemon::with_child(pid, child)))
    }

    async fn terminate(&self, daemon: &mut DaemonHandle) {
        let DaemonHandle::Owned(owned) = daemon else {
            debug!(target: PROCESS_TARGET, "leaving foreign daemon running");
            return;
        };
        let pid = owned.pid;
        let Some(mut child) = owned.child.take() else {
            debug!(target: PROCESS_TARGET, pid, "daemon already released");
            return;
        };
        request_stop(pid, &mut child);
        match tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                info!(target: PROCESS_TARGET, pid, %status, "daemon stopped");
            }
            Ok(Err(error)) => {
                warn!(target: PROCESS_TARGET, pid, error = %error, "failed to reap daemon");
            }
            Err(_) => {
                warn!(
                    target: PROCESS_TARGET,
                    pid,
                    grace_secs = TERMINATE_GRACE.as_secs(),
                    "daemon ignored stop request; killing"
                );
                if let Err(error) = child.kill().await {
                    warn!(target: PROCESS_TARGET, pid, error = %error, "failed to kill daemon");
                }
            }
        }
    }
}

#[cfg(unix)]
fn request_stop(pid: u32, child: &mut Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        warn!(target: PROCESS_TARGET, pid, "pid out of range; killing instead");
        force_stop(pid, child);
        return;
    };
    if let Err(errno) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
        warn!(target: PROCESS_TARGET, pid, error = %errno, "SIGTERM failed; killing instead");
        force_stop(pid, child);
    }
}

#[cfg(not(unix))]
fn request_stop(pid: u32, child: &mut Child) {
    force_stop(pid, child);
}

fn force_stop(pid: u32, child: &mut Child) {
    if let Err(error) = child.start_kill() {
        warn!(target: PROCESS_TARGET, pid, error = %error, "failed to kill daemon");
    }
}
