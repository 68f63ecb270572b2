//! Startup orchestration for the IPFS daemon behind the Orion desktop app.
//!
//! A single [`Sequencer`] run takes the application from "nothing known" to a
//! usable daemon:
//!
//! 1. probe the API address for a daemon that is already running;
//! 2. either adopt it, or prepare and launch a private daemon (on alternate
//!    ports when a foreign one owns the defaults);
//! 3. wait for the API, re-apply the listen addresses, and wait again;
//! 4. fetch the curated peer list and connect to and persist every peer.
//!
//! Progress is pushed to a [`ProgressListener`]. Configuration, process and
//! readiness errors end the run with exactly one [`StartupFailure`]; directory
//! and per-peer failures are logged and never fail startup.
//!
//! Every side effect sits behind a trait ([`ApiConnector`], [`Repository`],
//! [`Supervisor`], [`PeerDirectory`], [`NodeChooser`]) so the sequence can be
//! exercised without a real daemon.

mod api;
mod chooser;
mod error;
mod peers;
mod probe;
mod process;
mod progress;
mod readiness;
mod repo;
mod sequence;
mod stage;
pub mod telemetry;

pub use api::{ApiConnector, ApiError, HttpApiConnector, NodeApi};
pub use chooser::{ExistingNode, FixedChooser, NodeChoice, NodeChooser};
pub use error::{BootstrapError, FailureKind, StartupFailure};
pub use peers::{
    BootstrapReport, DirectoryError, HttpPeerDirectory, PeerAddress, PeerDirectory, PeerOutcome,
    bootstrap_peers, fetch_directory_peers, parse_peer_list,
};
pub use probe::probe_running_api;
pub use process::{
    DaemonHandle, INSTANCE_LOCK_FILE, INSTANCE_PID_FILE, InstanceError, InstanceGuard,
    IpfsSupervisor, OwnedDaemon, SpawnError, Supervisor,
};
pub use progress::{ProgressEvent, ProgressListener, StructuredProgressListener};
pub use readiness::{ReadinessError, ReadinessPolicy, await_ready};
pub use repo::{IpfsRepository, REPO_CONFIG_FILE, Repository, RepositoryError};
pub use sequence::{
    Collaborators, FailedStartup, ReadyNode, Sequencer, SequencerSettings, StartupOutcome,
    shutdown,
};
pub use stage::{Checkpoint, Signal, Stage, transition};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
