use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::process;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use super::PROCESS_TARGET;

/// Lock file name created beside the repository.
pub const INSTANCE_LOCK_FILE: &str = "orion.lock";

/// PID file name created beside the repository.
pub const INSTANCE_PID_FILE: &str = "orion.pid";

/// Errors raised while claiming the single-instance lock.
#[derive(Debug, Error)]
pub enum InstanceError {
    /// The directory holding the lock could not be created.
    #[error("failed to prepare instance directory '{path}': {source}")]
    Directory {
        /// Directory path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The lock file could not be created.
    #[error("failed to create lock file '{path}': {source}")]
    LockCreate {
        /// Lock file path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Another live process holds the lock.
    #[error("Orion is already running with pid {pid}")]
    AlreadyRunning {
        /// PID recorded by the holder.
        pid: u32,
    },
    /// The lock exists but names no holder, so it may still be mid-claim.
    #[error("lock file '{path}' is held by an unidentified process; remove it if no instance is running")]
    LockHeld {
        /// Lock file path.
        path: Utf8PathBuf,
    },
    /// The PID file could not be written.
    #[error("failed to write pid file '{path}': {source}")]
    PidWrite {
        /// PID file path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Stale files could not be removed.
    #[error("failed to remove stale file '{path}': {source}")]
    Cleanup {
        /// Path that could not be removed.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Liveness of the recorded holder could not be determined.
    #[cfg(unix)]
    #[error("failed to check whether pid {pid} is alive: {source}")]
    CheckProcess {
        /// PID under test.
        pid: u32,
        /// Errno reported by `kill`.
        #[source]
        source: nix::errno::Errno,
    },
}

/// Exclusive claim that this is the only application instance using a
/// repository. Files are removed when the guard drops.
#[derive(Debug)]
pub struct InstanceGuard {
    lock_path: Utf8PathBuf,
    pid_path: Utf8PathBuf,
    _lock: File,
}

impl InstanceGuard {
    /// Claims the lock in the directory containing `repo_path`.
    pub fn acquire_for_repo(repo_path: &Utf8Path) -> Result<Self, InstanceError> {
        let directory = repo_path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or(repo_path);
        Self::acquire(directory)
    }

    /// Claims the lock inside `directory` and records the current pid.
    pub fn acquire(directory: &Utf8Path) -> Result<Self, InstanceError> {
        fs::create_dir_all(directory).map_err(|source| InstanceError::Directory {
            path: directory.to_path_buf(),
            source,
        })?;
        let lock_path = directory.join(INSTANCE_LOCK_FILE);
        let pid_path = directory.join(INSTANCE_PID_FILE);
        let lock = acquire_lock(&lock_path, &pid_path)?;
        let guard = Self {
            lock_path,
            pid_path,
            _lock: lock,
        };
        guard.write_pid(process::id())?;
        Ok(guard)
    }

    /// Lock file path.
    #[must_use]
    pub fn lock_path(&self) -> &Utf8Path {
        &self.lock_path
    }

    /// PID file path.
    #[must_use]
    pub fn pid_path(&self) -> &Utf8Path {
        &self.pid_path
    }

    fn write_pid(&self, pid: u32) -> Result<(), InstanceError> {
        let pid_error = |source| InstanceError::PidWrite {
            path: self.pid_path.clone(),
            source,
        };
        let mut file = restricted_options()
            .truncate(true)
            .create(true)
            .open(&self.pid_path)
            .map_err(pid_error)?;
        writeln!(file, "{pid}").map_err(pid_error)?;
        file.sync_all().map_err(pid_error)?;
        info!(
            target: PROCESS_TARGET,
            pid,
            file = %self.pid_path,
            "instance pid recorded"
        );
        Ok(())
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        for path in [&self.pid_path, &self.lock_path] {
            match fs::remove_file(path) {
                Err(error) if error.kind() != io::ErrorKind::NotFound => {
                    warn!(
                        target: PROCESS_TARGET,
                        file = %path,
                        error = %error,
                        "failed to remove instance file"
                    );
                }
                _ => {}
            }
        }
    }
}

fn restricted_options() -> OpenOptions {
    let mut options = OpenOptions::new();
    options.write(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
}

fn acquire_lock(lock_path: &Utf8Path, pid_path: &Utf8Path) -> Result<File, InstanceError> {
    match create_lock(lock_path) {
        Err(InstanceError::LockCreate { source, .. })
            if source.kind() == io::ErrorKind::AlreadyExists =>
        {
            reclaim_stale_lock(lock_path, pid_path)?;
            create_lock(lock_path).map_err(|error| match error {
                InstanceError::LockCreate { source, .. }
                    if source.kind() == io::ErrorKind::AlreadyExists =>
                {
                    InstanceError::LockHeld {
                        path: lock_path.to_path_buf(),
                    }
                }
                other => other,
            })
        }
        result => result,
    }
}

/// Creates the lock exclusively and stamps it with the current pid.
fn create_lock(lock_path: &Utf8Path) -> Result<File, InstanceError> {
    let lock_error = |source| InstanceError::LockCreate {
        path: lock_path.to_path_buf(),
        source,
    };
    let mut file = restricted_options()
        .create_new(true)
        .open(lock_path)
        .map_err(lock_error)?;
    writeln!(file, "{}", process::id()).map_err(lock_error)?;
    file.sync_all().map_err(lock_error)?;
    info!(target: PROCESS_TARGET, file = %lock_path, "acquired instance lock");
    Ok(file)
}

// An unreadable holder means another process may be between creating the
// lock and stamping it, so only a recorded dead pid permits reclaiming.
fn reclaim_stale_lock(lock_path: &Utf8Path, pid_path: &Utf8Path) -> Result<(), InstanceError> {
    let Some(pid) = read_pid(lock_path)
        .or_else(|| read_pid(pid_path))
        .filter(|pid| *pid != 0)
    else {
        info!(target: PROCESS_TARGET, file = %lock_path, "refusing to start: lock holder unknown");
        return Err(InstanceError::LockHeld {
            path: lock_path.to_path_buf(),
        });
    };
    if process_alive(pid)? {
        info!(target: PROCESS_TARGET, pid, "refusing to start: instance alive");
        return Err(InstanceError::AlreadyRunning { pid });
    }
    warn!(
        target: PROCESS_TARGET,
        pid,
        "previous instance not detected; cleaning stale files"
    );
    remove_file(lock_path)?;
    remove_file(pid_path)
}

fn read_pid(path: &Utf8Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

fn remove_file(path: &Utf8Path) -> Result<(), InstanceError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(InstanceError::Cleanup {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(unix)]
fn process_alive(pid: u32) -> Result<bool, InstanceError> {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return Ok(false);
    };
    match kill(Pid::from_raw(raw), None) {
        Ok(()) | Err(Errno::EPERM) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(source) => Err(InstanceError::CheckProcess { pid, source }),
    }
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> Result<bool, InstanceError> {
    Ok(true)
}
