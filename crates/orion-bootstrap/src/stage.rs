//! Startup stages and the pure transition function that orders them.

use std::fmt;

/// One step of the startup sequence.
///
/// `AwaitingApi` and `AwaitingApi2` are the same readiness wait, run once
/// after launch and again after the repository has been reconfigured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Checking whether a daemon already answers on the API address.
    ProbingExisting,
    /// Creating the repository if needed and writing listen addresses.
    Initializing,
    /// Launching the daemon executable.
    Starting,
    /// Waiting for the freshly started (or adopted) API to answer.
    AwaitingApi,
    /// Re-applying listen addresses to the running daemon's repository.
    Configuring,
    /// Waiting for the API again after reconfiguration.
    AwaitingApi2,
    /// Downloading the curated peer list.
    FetchingPeers,
    /// Connecting to and persisting curated peers.
    Bootstrapping,
    /// The daemon is usable.
    Ready,
    /// Startup was abandoned.
    Failed,
}

/// Result of running a stage, fed to [`transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Nothing answered the API probe.
    NoExistingNode,
    /// A daemon answered and will be used as is.
    AdoptExisting,
    /// A daemon answered but the application runs its own beside it.
    RejectExisting,
    /// The stage's work finished.
    Completed,
    /// The stage hit an unrecoverable error.
    Fatal,
}

/// Fixed progress checkpoint announced when a stage is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    /// Human-readable label.
    pub label: &'static str,
    /// Completion percentage, 0 to 100.
    pub percentage: u8,
}

const CANONICAL_ORDER: [Stage; 9] = [
    Stage::ProbingExisting,
    Stage::Initializing,
    Stage::Starting,
    Stage::AwaitingApi,
    Stage::Configuring,
    Stage::AwaitingApi2,
    Stage::FetchingPeers,
    Stage::Bootstrapping,
    Stage::Ready,
];

impl Stage {
    /// Non-failure stages in the order the sequence visits them.
    #[must_use]
    pub const fn canonical_order() -> &'static [Self] {
        &CANONICAL_ORDER
    }

    /// True for `Ready` and `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }

    /// Position in [`Stage::canonical_order`]; `None` for `Failed`.
    #[must_use]
    pub fn position(self) -> Option<usize> {
        CANONICAL_ORDER.iter().position(|stage| *stage == self)
    }

    /// Progress announced on entry, for the stages that carry one.
    #[must_use]
    pub const fn checkpoint(self) -> Option<Checkpoint> {
        let (label, percentage) = match self {
            Self::ProbingExisting => ("Starting IPFS daemon...", 0),
            Self::AwaitingApi => ("Initializing the IPFS daemon...", 20),
            Self::AwaitingApi2 => ("Connecting to the IPFS daemon...", 40),
            Self::FetchingPeers => ("Fetching a list of Siderus nodes...", 60),
            Self::Bootstrapping => ("Connecting to Siderus network...", 80),
            Self::Ready => ("Ready!", 100),
            Self::Initializing | Self::Starting | Self::Configuring | Self::Failed => {
                return None;
            }
        };
        Some(Checkpoint { label, percentage })
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::ProbingExisting => "probing-existing",
            Self::Initializing => "initializing",
            Self::Starting => "starting",
            Self::AwaitingApi => "awaiting-api",
            Self::Configuring => "configuring",
            Self::AwaitingApi2 => "awaiting-api-2",
            Self::FetchingPeers => "fetching-peers",
            Self::Bootstrapping => "bootstrapping",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Next stage after `stage` reports `signal`, or `None` when the pair is not
/// a legal move.
///
/// Terminal stages accept nothing. `Fatal` moves any other stage to `Failed`.
#[must_use]
pub const fn transition(stage: Stage, signal: Signal) -> Option<Stage> {
    use Signal::{AdoptExisting, Completed, Fatal, NoExistingNode, RejectExisting};
    use Stage::{
        AwaitingApi, AwaitingApi2, Bootstrapping, Configuring, Failed, FetchingPeers,
        Initializing, ProbingExisting, Ready, Starting,
    };

    let next = match (stage, signal) {
        (Ready | Failed, _) => return None,
        (_, Fatal) => Failed,
        (ProbingExisting, NoExistingNode | RejectExisting) => Initializing,
        (ProbingExisting, AdoptExisting) => AwaitingApi,
        (Initializing, Completed) => Starting,
        (Starting, Completed) => AwaitingApi,
        (AwaitingApi, Completed) => Configuring,
        (Configuring, Completed) => AwaitingApi2,
        (AwaitingApi2, Completed) => FetchingPeers,
        (FetchingPeers, Completed) => Bootstrapping,
        (Bootstrapping, Completed) => Ready,
        _ => return None,
    };
    Some(next)
}
