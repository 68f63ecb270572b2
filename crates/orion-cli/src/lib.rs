//! Command-line runtime for the Orion node bootstrapper.
//!
//! [`run`] loads configuration, installs telemetry, claims the
//! single-instance lock, then drives the startup sequence with the real
//! daemon, repository and directory clients. Once the daemon is ready the
//! process waits for Ctrl-C and stops the daemon it launched; an adopted
//! daemon is left running.

use std::ffi::OsString;
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use orion_bootstrap::{
    Collaborators, HttpApiConnector, HttpPeerDirectory, InstanceGuard, IpfsRepository,
    IpfsSupervisor, ReadinessPolicy, Sequencer, SequencerSettings, shutdown, telemetry,
};
use orion_config::{Config, EndpointConfig, OrthoConfig};

mod errors;
mod progress;
mod prompt;

pub use errors::AppError;
pub use progress::{ConsoleProgress, format_progress};
pub use prompt::{PolicyChooser, ask, parse_answer, render_question};

const CLI_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::run");

/// Runs the bootstrapper with `args` and returns the process exit code.
pub async fn run<I>(args: I) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
{
    match run_inner(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            if !error.already_reported() {
                let mut stderr = io::stderr();
                if writeln!(stderr, "orion: {error}").is_err() {
                    warn!(target: CLI_TARGET, error = %error, "failed to report error");
                }
            }
            ExitCode::FAILURE
        }
    }
}

async fn run_inner<I>(args: I) -> Result<(), AppError>
where
    I: IntoIterator<Item = OsString>,
{
    let config = Config::load_from_iter(args).map_err(AppError::LoadConfiguration)?;
    telemetry::initialise(&config)?;

    let endpoints = EndpointConfig::from_config(&config);
    let _instance = InstanceGuard::acquire_for_repo(endpoints.repo_path())?;
    info!(
        target: CLI_TARGET,
        repo = %endpoints.repo_path(),
        api = %endpoints.api(),
        "starting Orion"
    );

    let supervisor = Arc::new(IpfsSupervisor::new());
    let collaborators = Collaborators {
        api: Arc::new(HttpApiConnector::new(Duration::from_millis(
            config.probe_timeout_ms(),
        ))?),
        repository: Arc::new(IpfsRepository::new(endpoints.binary_path().to_path_buf())),
        supervisor: supervisor.clone(),
        directory: Arc::new(HttpPeerDirectory::new(
            config.directory_url(),
            Duration::from_millis(config.directory_timeout_ms()),
        )?),
        chooser: Arc::new(PolicyChooser::new(config.existing_node())),
        listener: Arc::new(ConsoleProgress::new(io::stderr())),
    };
    let settings = SequencerSettings {
        expected_version: config.ipfs_version().to_owned(),
        readiness: ReadinessPolicy::from_millis(
            config.startup_timeout_ms(),
            config.probe_interval_ms(),
        ),
    };

    let outcome = Sequencer::new(collaborators, settings, endpoints).run().await;
    let failure = outcome.failure().cloned();
    if outcome.is_ready() {
        wait_for_interrupt().await;
    }
    shutdown(supervisor.as_ref(), outcome.into_daemon()).await;
    failure.map_or(Ok(()), |startup| Err(AppError::Startup(startup)))
}

async fn wait_for_interrupt() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!(target: CLI_TARGET, "interrupt received; shutting down"),
        Err(error) => warn!(
            target: CLI_TARGET,
            error = %error,
            "cannot listen for interrupts; shutting down"
        ),
    }
}
