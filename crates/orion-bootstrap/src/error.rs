//! Sequence-level failures and their user-facing classification.

use std::fmt;

use thiserror::Error;

use orion_config::MultiaddrError;

use crate::api::ApiError;
use crate::process::SpawnError;
use crate::readiness::ReadinessError;
use crate::repo::RepositoryError;
use crate::stage::{Signal, Stage};

/// Unrecoverable error that ends the startup sequence.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// The repository could not be initialised or configured.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    /// The daemon could not be launched.
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    /// The daemon API never became ready.
    #[error(transparent)]
    Readiness(#[from] ReadinessError),
    /// No API client could be built for the configured address.
    #[error(transparent)]
    Api(#[from] ApiError),
    /// The alternate endpoint set could not be derived.
    #[error("cannot derive alternate endpoints: {source}")]
    AlternateEndpoints {
        /// Port arithmetic failure.
        #[source]
        source: MultiaddrError,
    },
    /// The sequence attempted a move the stage machine forbids.
    #[error("illegal stage transition from {stage} on {signal:?}")]
    InvalidTransition {
        /// Stage the sequence was in.
        stage: Stage,
        /// Signal that was rejected.
        signal: Signal,
    },
}

/// Broad class of a fatal startup error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Configuration, filesystem or process failure.
    Configuration,
    /// The daemon API did not answer within its budget.
    Timeout,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Configuration => "configuration",
            Self::Timeout => "timeout",
        })
    }
}

impl BootstrapError {
    /// Classifies the error for presentation.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Readiness(ReadinessError::ApiTimeout { .. }) => FailureKind::Timeout,
            _ => FailureKind::Configuration,
        }
    }
}

/// Terminal failure handed to the progress listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupFailure {
    /// Stage that was running when the error surfaced.
    pub stage: Stage,
    /// Error class.
    pub kind: FailureKind,
    /// Message suitable for a single dialog.
    pub message: String,
}

impl StartupFailure {
    /// Captures `error` raised while `stage` was running.
    #[must_use]
    pub fn new(stage: Stage, error: &BootstrapError) -> Self {
        Self {
            stage,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for StartupFailure {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.message)
    }
}
