//! Shared configuration for the Orion desktop node bootstrap.
//!
//! Values are layered by `ortho_config`: built-in defaults, then an optional
//! configuration file (`--config-path`), then `ORION_*` environment
//! variables, then command-line flags. The resolved [`Config`] feeds
//! [`EndpointConfig::from_config`], which produces the endpoint set used for
//! one run of the startup sequence.

mod defaults;
mod endpoints;
mod logging;
mod multiaddr;
mod policy;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

pub use defaults::{
    ALTERNATE_PORT_OFFSET, DEFAULT_API_PORT, DEFAULT_DIRECTORY_URL, DEFAULT_GATEWAY_PORT,
    DEFAULT_IPFS_BINARY, DEFAULT_IPFS_VERSION, DEFAULT_LOG_FILTER, DEFAULT_SWARM_PORT,
    default_api_address, default_gateway_address, default_log_format, default_repo_path,
    swarm_addresses,
};
pub use endpoints::EndpointConfig;
pub use logging::{LogFormat, LogFormatParseError};
pub use multiaddr::{DnsProtocol, Multiaddr, MultiaddrError, MultiaddrHost};
pub use ortho_config::OrthoConfig;
pub use policy::{ExistingNodePolicy, ExistingNodePolicyParseError};

use defaults::{
    default_directory_timeout_ms, default_directory_url, default_ipfs_binary,
    default_ipfs_version, default_log_filter_string, default_probe_interval_ms,
    default_probe_timeout_ms, default_startup_timeout_ms, default_swarm_port,
};

/// Resolved application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "ORION")]
pub struct Config {
    /// Multiaddr of the daemon HTTP API.
    #[serde(default = "default_api_address")]
    #[ortho_config(default = default_api_address())]
    pub api_address: Multiaddr,
    /// Multiaddr of the daemon HTTP gateway.
    #[serde(default = "default_gateway_address")]
    #[ortho_config(default = default_gateway_address())]
    pub gateway_address: Multiaddr,
    /// TCP port for the IPv4 and IPv6 swarm listeners.
    #[serde(default = "default_swarm_port")]
    #[ortho_config(default = default_swarm_port())]
    pub swarm_port: u16,
    /// Repository directory; defaults beneath the user data directory.
    #[serde(default)]
    pub repo_path: Option<Utf8PathBuf>,
    /// Daemon executable.
    #[serde(default = "default_ipfs_binary")]
    #[ortho_config(default = default_ipfs_binary())]
    pub ipfs_binary: String,
    /// Daemon release the application expects.
    #[serde(default = "default_ipfs_version")]
    #[ortho_config(default = default_ipfs_version())]
    pub ipfs_version: String,
    /// Directory service listing curated peers.
    #[serde(default = "default_directory_url")]
    #[ortho_config(default = default_directory_url())]
    pub directory_url: String,
    /// Behaviour when a daemon already answers on the API address.
    #[serde(default)]
    #[ortho_config(default = ExistingNodePolicy::Ask)]
    pub existing_node: ExistingNodePolicy,
    /// Budget for the API readiness gate, in milliseconds.
    #[serde(default = "default_startup_timeout_ms")]
    #[ortho_config(default = default_startup_timeout_ms())]
    pub startup_timeout_ms: u64,
    /// Pause between readiness probes, in milliseconds.
    #[serde(default = "default_probe_interval_ms")]
    #[ortho_config(default = default_probe_interval_ms())]
    pub probe_interval_ms: u64,
    /// Budget for one API request, in milliseconds.
    #[serde(default = "default_probe_timeout_ms")]
    #[ortho_config(default = default_probe_timeout_ms())]
    pub probe_timeout_ms: u64,
    /// Budget for the directory service request, in milliseconds.
    #[serde(default = "default_directory_timeout_ms")]
    #[ortho_config(default = default_directory_timeout_ms())]
    pub directory_timeout_ms: u64,
    /// `tracing` filter expression.
    #[serde(default = "default_log_filter_string")]
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Log output format.
    #[serde(default = "default_log_format")]
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_address: default_api_address(),
            gateway_address: default_gateway_address(),
            swarm_port: default_swarm_port(),
            repo_path: None,
            ipfs_binary: default_ipfs_binary(),
            ipfs_version: default_ipfs_version(),
            directory_url: default_directory_url(),
            existing_node: ExistingNodePolicy::default(),
            startup_timeout_ms: default_startup_timeout_ms(),
            probe_interval_ms: default_probe_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            directory_timeout_ms: default_directory_timeout_ms(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Daemon HTTP API multiaddr.
    #[must_use]
    pub const fn api_address(&self) -> &Multiaddr {
        &self.api_address
    }

    /// Daemon gateway multiaddr.
    #[must_use]
    pub const fn gateway_address(&self) -> &Multiaddr {
        &self.gateway_address
    }

    /// Swarm listener port.
    #[must_use]
    pub const fn swarm_port(&self) -> u16 {
        self.swarm_port
    }

    /// Repository directory, falling back to [`default_repo_path`].
    #[must_use]
    pub fn repo_path(&self) -> Utf8PathBuf {
        self.repo_path.clone().unwrap_or_else(default_repo_path)
    }

    /// Daemon executable.
    #[must_use]
    pub fn ipfs_binary(&self) -> &str {
        &self.ipfs_binary
    }

    /// Expected daemon release.
    #[must_use]
    pub fn ipfs_version(&self) -> &str {
        &self.ipfs_version
    }

    /// Directory service URL.
    #[must_use]
    pub fn directory_url(&self) -> &str {
        &self.directory_url
    }

    /// Policy for an already-running daemon.
    #[must_use]
    pub const fn existing_node(&self) -> ExistingNodePolicy {
        self.existing_node
    }

    /// Readiness budget in milliseconds.
    #[must_use]
    pub const fn startup_timeout_ms(&self) -> u64 {
        self.startup_timeout_ms
    }

    /// Readiness probe interval in milliseconds.
    #[must_use]
    pub const fn probe_interval_ms(&self) -> u64 {
        self.probe_interval_ms
    }

    /// Single-request API budget in milliseconds.
    #[must_use]
    pub const fn probe_timeout_ms(&self) -> u64 {
        self.probe_timeout_ms
    }

    /// Directory request budget in milliseconds.
    #[must_use]
    pub const fn directory_timeout_ms(&self) -> u64 {
        self.directory_timeout_ms
    }

    /// Configured log filter.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Configured log format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}
