//! Observer seam for startup progress.

use std::sync::Arc;

use orion_config::EndpointConfig;

use crate::error::StartupFailure;
use crate::stage::{Checkpoint, Stage};

const PROGRESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::progress");

/// Progress notification pushed to the listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Label describing the stage being entered.
    pub label: String,
    /// Completion percentage, 0 to 100.
    pub percentage: u8,
}

impl From<Checkpoint> for ProgressEvent {
    fn from(checkpoint: Checkpoint) -> Self {
        Self {
            label: checkpoint.label.to_owned(),
            percentage: checkpoint.percentage,
        }
    }
}

/// Receives startup notifications. Purely observational.
pub trait ProgressListener: Send + Sync {
    /// A stage is about to run.
    fn stage_entered(&self, stage: Stage);

    /// A progress checkpoint was reached.
    fn progress(&self, event: &ProgressEvent);

    /// The daemon is usable at `endpoints`. Called at most once.
    fn ready(&self, endpoints: &EndpointConfig);

    /// Startup failed. Called at most once.
    fn failed(&self, failure: &StartupFailure);
}

impl<T> ProgressListener for Arc<T>
where
    T: ProgressListener + ?Sized,
{
    fn stage_entered(&self, stage: Stage) {
        (**self).stage_entered(stage);
    }

    fn progress(&self, event: &ProgressEvent) {
        (**self).progress(event);
    }

    fn ready(&self, endpoints: &EndpointConfig) {
        (**self).ready(endpoints);
    }

    fn failed(&self, failure: &StartupFailure) {
        (**self).failed(failure);
    }
}

/// Listener that records every notification with `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredProgressListener;

impl StructuredProgressListener {
    /// Builds a new listener.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ProgressListener for StructuredProgressListener {
    fn stage_entered(&self, stage: Stage) {
        tracing::debug!(
            target: PROGRESS_TARGET,
            event = "stage_entered",
            %stage,
            "entering startup stage"
        );
    }

    fn progress(&self, event: &ProgressEvent) {
        tracing::info!(
            target: PROGRESS_TARGET,
            event = "progress",
            percentage = event.percentage,
            label = %event.label,
            "startup progress"
        );
    }

    fn ready(&self, endpoints: &EndpointConfig) {
        tracing::info!(
            target: PROGRESS_TARGET,
            event = "ready",
            api = %endpoints.api(),
            gateway = %endpoints.gateway(),
            repo = %endpoints.repo_path(),
            "daemon ready"
        );
    }

    fn failed(&self, failure: &StartupFailure) {
        tracing::error!(
            target: PROGRESS_TARGET,
            event = "failed",
            stage = %failure.stage,
            kind = %failure.kind,
            message = %failure.message,
            "startup failed"
        );
    }
}
