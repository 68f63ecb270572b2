//! Entrypoint for the Orion node bootstrapper.
//!
//! The binary delegates to [`orion_cli::run`], which loads configuration,
//! brings the IPFS daemon up and keeps it running until interrupted.

use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    orion_cli::run(std::env::args_os()).await
}
