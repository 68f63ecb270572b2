use std::sync::Arc;

use ortho_config::OrthoError;
use thiserror::Error;

use orion_bootstrap::{ApiError, DirectoryError, InstanceError, StartupFailure, TelemetryError};

/// Errors that end the CLI run.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(#[source] Arc<OrthoError>),
    /// Telemetry could not be installed.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    /// Another instance already owns the repository.
    #[error(transparent)]
    Instance(#[from] InstanceError),
    /// The daemon API client could not be built.
    #[error(transparent)]
    Api(#[from] ApiError),
    /// The directory client could not be built.
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    /// The startup sequence failed; already reported to the user.
    #[error("{0}")]
    Startup(StartupFailure),
}

impl AppError {
    /// True when the progress display has already shown this error.
    #[must_use]
    pub const fn already_reported(&self) -> bool {
        matches!(self, Self::Startup(_))
    }
}
