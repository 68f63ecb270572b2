//! Drives the startup stages from probe to ready.
//!
//! The [`Sequencer`] owns the run's [`EndpointConfig`] and [`DaemonHandle`].
//! Each stage runs to completion before the pure [`transition`] function
//! picks the next one; the first fatal error moves the run to
//! [`Stage::Failed`] and nothing is retried or rolled back.

use std::sync::Arc;

use tracing::{error, info, warn};

use orion_config::EndpointConfig;

use crate::api::{ApiConnector, NodeApi};
use crate::chooser::{ExistingNode, NodeChoice, NodeChooser};
use crate::error::{BootstrapError, StartupFailure};
use crate::peers::{BootstrapReport, PeerDirectory, bootstrap_peers, fetch_directory_peers};
use crate::probe::probe_running_api;
use crate::process::{DaemonHandle, Supervisor};
use crate::progress::{ProgressEvent, ProgressListener};
use crate::readiness::{ReadinessPolicy, await_ready};
use crate::repo::Repository;
use crate::stage::{Signal, Stage, transition};

const SEQUENCE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::sequence");

/// External components the sequence calls into.
#[derive(Clone)]
pub struct Collaborators {
    /// Builds daemon API clients.
    pub api: Arc<dyn ApiConnector>,
    /// Prepares the on-disk repository.
    pub repository: Arc<dyn Repository>,
    /// Launches and stops the daemon.
    pub supervisor: Arc<dyn Supervisor>,
    /// Supplies curated peers.
    pub directory: Arc<dyn PeerDirectory>,
    /// Decides what to do with an existing daemon.
    pub chooser: Arc<dyn NodeChooser>,
    /// Receives progress notifications.
    pub listener: Arc<dyn ProgressListener>,
}

/// Tunables for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencerSettings {
    /// Daemon version the application was built against.
    pub expected_version: String,
    /// Budget shared by both readiness waits.
    pub readiness: ReadinessPolicy,
}

/// Result of a completed run.
#[derive(Debug)]
pub enum StartupOutcome {
    /// The daemon is usable.
    Ready(ReadyNode),
    /// Startup failed.
    Failed(FailedStartup),
}

/// State handed over when startup succeeds.
#[derive(Debug)]
pub struct ReadyNode {
    /// Daemon in use.
    pub daemon: DaemonHandle,
    /// Endpoints the daemon listens on.
    pub endpoints: EndpointConfig,
    /// Per-peer bootstrap results.
    pub peers: BootstrapReport,
}

/// State handed over when startup fails.
#[derive(Debug)]
pub struct FailedStartup {
    /// Daemon launched or adopted before the failure, if any. Left running
    /// until shutdown.
    pub daemon: Option<DaemonHandle>,
    /// Failure presented to the user.
    pub failure: StartupFailure,
}

impl StartupOutcome {
    /// True for [`StartupOutcome::Ready`].
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// The failure, if startup failed.
    #[must_use]
    pub const fn failure(&self) -> Option<&StartupFailure> {
        match self {
            Self::Ready(_) => None,
            Self::Failed(failed) => Some(&failed.failure),
        }
    }

    /// Releases the daemon handle for shutdown.
    #[must_use]
    pub fn into_daemon(self) -> Option<DaemonHandle> {
        match self {
            Self::Ready(ready) => Some(ready.daemon),
            Self::Failed(failed) => failed.daemon,
        }
    }
}

/// The startup state machine for one application run.
pub struct Sequencer {
    collaborators: Collaborators,
    settings: SequencerSettings,
    stage: Stage,
    endpoints: EndpointConfig,
    daemon: Option<DaemonHandle>,
}

impl Sequencer {
    /// Prepares a run against the default `endpoints`.
    #[must_use]
    pub const fn new(
        collaborators: Collaborators,
        settings: SequencerSettings,
        endpoints: EndpointConfig,
    ) -> Self {
        Self {
            collaborators,
            settings,
            stage: Stage::ProbingExisting,
            endpoints,
            daemon: None,
        }
    }

    /// Current stage.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        self.stage
    }

    /// Runs every stage and reports exactly one terminal outcome to the
    /// listener.
    pub async fn run(mut self) -> StartupOutcome {
        self.announce();
        match self.drive().await {
            Ok(peers) => {
                self.collaborators.listener.ready(&self.endpoints);
                StartupOutcome::Ready(ReadyNode {
                    daemon: self.daemon.unwrap_or(DaemonHandle::Foreign),
                    endpoints: self.endpoints,
                    peers,
                })
            }
            Err(cause) => {
                let failure = StartupFailure::new(self.stage, &cause);
                error!(
                    target: SEQUENCE_TARGET,
                    stage = %self.stage,
                    kind = %failure.kind,
                    error = %cause,
                    "startup sequence failed"
                );
                self.stage = transition(self.stage, Signal::Fatal).unwrap_or(Stage::Failed);
                self.collaborators.listener.stage_entered(self.stage);
                self.collaborators.listener.failed(&failure);
                StartupOutcome::Failed(FailedStartup {
                    daemon: self.daemon,
                    failure,
                })
            }
        }
    }

    async fn drive(&mut self) -> Result<BootstrapReport, BootstrapError> {
        let decision = self.probe_existing().await?;
        self.advance(decision)?;

        if decision != Signal::AdoptExisting {
            let repo = self.endpoints.repo_path().to_path_buf();
            self.collaborators.repository.ensure_initialized(&repo).await?;
            self.collaborators
                .repository
                .ensure_configured(&repo, &self.endpoints)
                .await?;
            self.advance(Signal::Completed)?;

            let daemon = self.collaborators.supervisor.spawn(&self.endpoints).await?;
            self.daemon = Some(daemon);
            self.advance(Signal::Completed)?;
        }

        let api = self.collaborators.api.connect(self.endpoints.api())?;
        self.await_api(api.as_ref()).await?;
        self.advance(Signal::Completed)?;

        self.reconfigure().await?;
        self.advance(Signal::Completed)?;

        self.await_api(api.as_ref()).await?;
        self.advance(Signal::Completed)?;

        let peers = fetch_directory_peers(self.collaborators.directory.as_ref()).await;
        self.advance(Signal::Completed)?;

        let report = bootstrap_peers(api.as_ref(), &peers).await;
        self.advance(Signal::Completed)?;
        Ok(report)
    }

    /// Probes the API address and resolves the adopt-or-reject branch.
    async fn probe_existing(&mut self) -> Result<Signal, BootstrapError> {
        let version = match self.collaborators.api.connect(self.endpoints.api()) {
            Ok(api) => probe_running_api(api.as_ref()).await,
            Err(cause) => {
                warn!(
                    target: SEQUENCE_TARGET,
                    error = %cause,
                    "cannot probe API address; assuming no daemon"
                );
                None
            }
        };
        let Some(version) = version else {
            return Ok(Signal::NoExistingNode);
        };

        let node = ExistingNode {
            version,
            expected_version: self.settings.expected_version.clone(),
        };
        if let Some(advisory) = node.advisory() {
            warn!(target: SEQUENCE_TARGET, %advisory, "existing daemon version differs");
        }
        match self.collaborators.chooser.choose(&node).await {
            NodeChoice::Adopt => {
                info!(
                    target: SEQUENCE_TARGET,
                    api = %self.endpoints.api(),
                    "using existing daemon"
                );
                self.daemon = Some(DaemonHandle::Foreign);
                Ok(Signal::AdoptExisting)
            }
            NodeChoice::Reject => {
                let alternate = self
                    .endpoints
                    .alternate()
                    .map_err(|source| BootstrapError::AlternateEndpoints { source })?;
                info!(
                    target: SEQUENCE_TARGET,
                    api = %alternate.api(),
                    "running a private daemon on alternate ports"
                );
                self.endpoints = alternate;
                Ok(Signal::RejectExisting)
            }
        }
    }

    /// Re-applies the listen addresses to an owned daemon's repository.
    async fn reconfigure(&self) -> Result<(), BootstrapError> {
        if self.daemon.as_ref().is_some_and(DaemonHandle::is_owned) {
            self.collaborators
                .repository
                .ensure_configured(self.endpoints.repo_path(), &self.endpoints)
                .await?;
        } else {
            info!(
                target: SEQUENCE_TARGET,
                "adopted daemon keeps its own configuration"
            );
        }
        info!(
            target: SEQUENCE_TARGET,
            repo = %self.endpoints.repo_path(),
            api = %self.endpoints.api(),
            "daemon configured"
        );
        Ok(())
    }

    async fn await_api(&mut self, api: &dyn NodeApi) -> Result<(), BootstrapError> {
        let mut foreign = DaemonHandle::Foreign;
        let daemon = self.daemon.as_mut().unwrap_or(&mut foreign);
        await_ready(api, daemon, self.settings.readiness, self.endpoints.api()).await?;
        Ok(())
    }

    fn advance(&mut self, signal: Signal) -> Result<(), BootstrapError> {
        let next = transition(self.stage, signal).ok_or(BootstrapError::InvalidTransition {
            stage: self.stage,
            signal,
        })?;
        self.stage = next;
        self.announce();
        Ok(())
    }

    fn announce(&self) {
        let listener = &self.collaborators.listener;
        listener.stage_entered(self.stage);
        if let Some(checkpoint) = self.stage.checkpoint() {
            listener.progress(&ProgressEvent::from(checkpoint));
        }
    }
}

/// Stops the daemon at application shutdown if this run launched it.
pub async fn shutdown(supervisor: &dyn Supervisor, daemon: Option<DaemonHandle>) {
    match daemon {
        Some(mut handle) if handle.is_owned() => supervisor.terminate(&mut handle).await,
        Some(_) => info!(target: SEQUENCE_TARGET, "leaving adopted daemon running"),
        None => info!(target: SEQUENCE_TARGET, "no daemon to stop"),
    }
}
