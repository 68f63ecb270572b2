//! Tracing subscriber for Orion's startup events.
//!
//! Every bootstrap module logs under its own `orion_bootstrap::<area>`
//! target (`sequence`, `process`, `readiness`, `peers` and so on), so a
//! filter such as `orion_bootstrap::peers=debug` narrows output to one stage.
//! Events go to stderr. The HTTP client stack stays at `warn` unless the
//! filter names it explicitly.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::time::UtcTime;

use orion_config::{Config, LogFormat};

/// Transport crates quietened unless the filter mentions them.
const TRANSPORT_TARGETS: [&str; 3] = ["hyper", "hyper_util", "reqwest"];

static INSTALLED_FORMAT: OnceCell<LogFormat> = OnceCell::new();

/// Proof that the process-wide subscriber is in place.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle {
    format: LogFormat,
}

impl TelemetryHandle {
    /// Format chosen by the first successful initialisation.
    #[must_use]
    pub const fn format(self) -> LogFormat {
        self.format
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured filter expression did not parse.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// The global subscriber could not be installed.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Installs the subscriber described by `config`.
///
/// Only the first call touches global state. Later calls report the format
/// already in effect, even if `config` asks for another.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    INSTALLED_FORMAT
        .get_or_try_init(|| {
            install_subscriber(config.log_filter(), config.log_format())?;
            Ok(config.log_format())
        })
        .map(|format| TelemetryHandle { format: *format })
}

fn startup_filter(expression: &str) -> Result<EnvFilter, TelemetryError> {
    let mut filter = EnvFilter::try_new(expression)
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;
    for target in TRANSPORT_TARGETS {
        if names_target(expression, target) {
            continue;
        }
        let directive: Directive = format!("{target}=warn")
            .parse()
            .map_err(|error: tracing_subscriber::filter::ParseError| {
                TelemetryError::Filter(error.to_string())
            })?;
        filter = filter.add_directive(directive);
    }
    Ok(filter)
}

fn names_target(expression: &str, target: &str) -> bool {
    expression
        .split(',')
        .filter_map(|directive| directive.split('=').next())
        .any(|name| name.trim().split("::").next() == Some(target))
}

fn install_subscriber(expression: &str, format: LogFormat) -> Result<(), TelemetryError> {
    let filter = startup_filter(expression)?;
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_timer(UtcTime::rfc_3339());

    let subscriber: Box<dyn Subscriber + Send + Sync> = if format.is_structured() {
        Box::new(builder.json().flatten_event(true).finish())
    } else {
        Box::new(builder.compact().finish())
    };
    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}
