//! Daemon process supervision and the single-instance guard.

mod instance;
mod supervisor;

pub use instance::{INSTANCE_LOCK_FILE, INSTANCE_PID_FILE, InstanceError, InstanceGuard};
pub use supervisor::{DaemonHandle, IpfsSupervisor, OwnedDaemon, SpawnError, Supervisor};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
