//! Terminal rendering of startup progress.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use orion_bootstrap::{
    ProgressEvent, ProgressListener, Stage, StartupFailure, StructuredProgressListener,
};
use orion_config::EndpointConfig;

/// Prints checkpoints to a writer and forwards everything to telemetry.
#[derive(Debug)]
pub struct ConsoleProgress<W> {
    out: Mutex<W>,
    telemetry: StructuredProgressListener,
}

impl<W: Write> ConsoleProgress<W> {
    /// Renders to `out`.
    #[must_use]
    pub const fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            telemetry: StructuredProgressListener::new(),
        }
    }

    /// Returns the writer, for inspection.
    #[must_use]
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn line(&self, text: &str) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(error) = writeln!(out, "{text}").and_then(|()| out.flush()) {
            tracing::debug!(error = %error, "failed to write progress line");
        }
    }
}

/// One progress line, e.g. `[ 60%] Fetching a list of Siderus nodes...`.
#[must_use]
pub fn format_progress(event: &ProgressEvent) -> String {
    format!("[{:>3}%] {}", event.percentage, event.label)
}

impl<W: Write + Send> ProgressListener for ConsoleProgress<W> {
    fn stage_entered(&self, stage: Stage) {
        self.telemetry.stage_entered(stage);
    }

    fn progress(&self, event: &ProgressEvent) {
        self.telemetry.progress(event);
        self.line(&format_progress(event));
    }

    fn ready(&self, endpoints: &EndpointConfig) {
        self.telemetry.ready(endpoints);
        self.line(&format!(
            "IPFS API at {}, gateway at {}. Press Ctrl-C to stop.",
            endpoints.api(),
            endpoints.gateway()
        ));
    }

    fn failed(&self, failure: &StartupFailure) {
        self.telemetry.failed(failure);
        self.line(&format!("error: {}", failure.message));
    }
}
