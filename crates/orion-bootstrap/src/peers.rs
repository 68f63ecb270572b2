//! Curated peer discovery and best-effort peer bootstrapping.
//!
//! Nothing in this module can fail the startup sequence: a directory outage
//! yields an empty peer set and every per-peer failure is recorded in the
//! [`BootstrapReport`] and logged.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{ApiError, NodeApi};

const PEERS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::peers");

/// Opaque multiaddr string identifying a remote peer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerAddress(String);

impl PeerAddress {
    /// Wraps a peer multiaddr; surrounding whitespace is dropped.
    #[must_use]
    pub fn new(address: impl AsRef<str>) -> Self {
        Self(address.as_ref().trim().to_owned())
    }

    /// Borrowed multiaddr text.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Source of the curated peer list.
#[async_trait]
pub trait PeerDirectory: Send + Sync {
    /// Fetches the current peer set.
    async fn fetch_peers(&self) -> Result<BTreeSet<PeerAddress>, DirectoryError>;
}

/// Errors raised by the directory service.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The request failed in transit.
    #[error("failed to fetch peers from {url}: {source}")]
    Request {
        /// Directory URL.
        url: String,
        /// Transport error.
        #[source]
        source: reqwest::Error,
    },
    /// The service answered with a non-success status.
    #[error("directory {url} answered with status {status}")]
    Status {
        /// Directory URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },
    /// The HTTP client could not be built.
    #[error("failed to build directory client: {source}")]
    Client {
        /// Builder error.
        #[source]
        source: reqwest::Error,
    },
}

/// Directory service reached over HTTP(S), returning one multiaddr per line.
#[derive(Debug, Clone)]
pub struct HttpPeerDirectory {
    url: String,
    client: Client,
}

impl HttpPeerDirectory {
    /// Builds a directory client for `url` with a whole-request `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, DirectoryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| DirectoryError::Client { source })?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl PeerDirectory for HttpPeerDirectory {
    async fn fetch_peers(&self) -> Result<BTreeSet<PeerAddress>, DirectoryError> {
        let request_error = |source| DirectoryError::Request {
            url: self.url.clone(),
            source,
        };
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(DirectoryError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }
        let body = response.text().await.map_err(request_error)?;
        Ok(parse_peer_list(&body))
    }
}

/// Parses a newline-separated peer list, skipping blanks and `#` comments.
#[must_use]
pub fn parse_peer_list(body: &str) -> BTreeSet<PeerAddress> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(PeerAddress::new)
        .collect()
}

/// Fetches the curated peers, substituting an empty set on failure.
pub async fn fetch_directory_peers(directory: &dyn PeerDirectory) -> BTreeSet<PeerAddress> {
    match directory.fetch_peers().await {
        Ok(peers) => {
            info!(
                target: PEERS_TARGET,
                count = peers.len(),
                "fetched curated peers"
            );
            peers
        }
        Err(error) => {
            warn!(
                target: PEERS_TARGET,
                error = %error,
                "peer directory unavailable; continuing without curated peers"
            );
            BTreeSet::new()
        }
    }
}

/// Connect and persist results for one peer.
#[derive(Debug)]
pub struct PeerOutcome {
    /// Peer that was contacted.
    pub peer: PeerAddress,
    /// Result of the live connection attempt.
    pub connect: Result<(), ApiError>,
    /// Result of the bootstrap list registration.
    pub persist: Result<(), ApiError>,
}

/// Per-peer detail of a bootstrap round.
#[derive(Debug, Default)]
pub struct BootstrapReport {
    outcomes: Vec<PeerOutcome>,
}

impl BootstrapReport {
    /// Per-peer outcomes in peer order.
    #[must_use]
    pub const fn outcomes(&self) -> &[PeerOutcome] {
        self.outcomes.as_slice()
    }

    /// Number of peers attempted.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// True when no peers were attempted.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Peers that accepted a live connection.
    #[must_use]
    pub fn connected(&self) -> usize {
        self.outcomes.iter().filter(|o| o.connect.is_ok()).count()
    }

    /// Peers registered as bootstrap entries.
    #[must_use]
    pub fn persisted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.persist.is_ok()).count()
    }

    /// Failed live connection attempts.
    #[must_use]
    pub fn connect_failures(&self) -> usize {
        self.len() - self.connected()
    }

    /// Failed bootstrap registrations.
    #[must_use]
    pub fn persist_failures(&self) -> usize {
        self.len() - self.persisted()
    }
}

/// Connects to and persists every peer concurrently, waiting for all.
///
/// Individual failures are logged and kept in the report; they never abort
/// the batch.
pub async fn bootstrap_peers(api: &dyn NodeApi, peers: &BTreeSet<PeerAddress>) -> BootstrapReport {
    let connecting = join_all(peers.iter().map(|peer| api.swarm_connect(peer)));
    let persisting = join_all(peers.iter().map(|peer| api.bootstrap_add(peer)));
    let (connects, persists) = futures::join!(connecting, persisting);

    let outcomes: Vec<PeerOutcome> = peers
        .iter()
        .zip(connects.into_iter().zip(persists))
        .map(|(peer, (connect, persist))| {
            log_outcome(peer, &connect, &persist);
            PeerOutcome {
                peer: peer.clone(),
                connect,
                persist,
            }
        })
        .collect();
    let report = BootstrapReport { outcomes };
    info!(
        target: PEERS_TARGET,
        peers = report.len(),
        connected = report.connected(),
        persisted = report.persisted(),
        "peer bootstrap settled"
    );
    report
}

fn log_outcome(peer: &PeerAddress, connect: &Result<(), ApiError>, persist: &Result<(), ApiError>) {
    match connect {
        Ok(()) => debug!(target: PEERS_TARGET, %peer, "connected to peer"),
        Err(error) => warn!(target: PEERS_TARGET, %peer, error = %error, "peer connect failed"),
    }
    match persist {
        Ok(()) => debug!(target: PEERS_TARGET, %peer, "peer added to bootstrap list"),
        Err(error) => warn!(
            target: PEERS_TARGET,
            %peer,
            error = %error,
            "bootstrap registration failed"
        ),
    }
}
