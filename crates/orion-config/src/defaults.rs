use std::env;
use std::net::{Ipv4Addr, Ipv6Addr};

use camino::Utf8PathBuf;
use dirs::data_dir;

use crate::logging::LogFormat;
use crate::multiaddr::Multiaddr;

/// Port the daemon's HTTP API listens on by default.
pub const DEFAULT_API_PORT: u16 = 5001;

/// Port the daemon's HTTP gateway listens on by default.
pub const DEFAULT_GATEWAY_PORT: u16 = 8080;

/// Port the daemon's swarm listeners bind by default.
pub const DEFAULT_SWARM_PORT: u16 = 4001;

/// Offset applied to every port when a foreign daemon already owns the
/// defaults.
pub const ALTERNATE_PORT_OFFSET: u16 = 100;

/// Executable launched when the application runs its own daemon.
pub const DEFAULT_IPFS_BINARY: &str = "ipfs";

/// Daemon release the application is built and tested against.
pub const DEFAULT_IPFS_VERSION: &str = "0.4.19";

/// Directory service listing the curated peer network.
pub const DEFAULT_DIRECTORY_URL: &str = "https://meta.siderus.io/ipfs/peers.txt";

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Total budget for the API readiness gate.
pub const DEFAULT_STARTUP_TIMEOUT_MS: u64 = 30_000;

/// Pause between readiness probes.
pub const DEFAULT_PROBE_INTERVAL_MS: u64 = 500;

/// Budget for a single API request while probing.
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 2_000;

/// Budget for the directory service request.
pub const DEFAULT_DIRECTORY_TIMEOUT_MS: u64 = 10_000;

/// Default API listener.
#[must_use]
pub const fn default_api_address() -> Multiaddr {
    Multiaddr::ip4(Ipv4Addr::LOCALHOST, DEFAULT_API_PORT)
}

/// Default gateway listener.
#[must_use]
pub const fn default_gateway_address() -> Multiaddr {
    Multiaddr::ip4(Ipv4Addr::LOCALHOST, DEFAULT_GATEWAY_PORT)
}

/// Default swarm port.
#[must_use]
pub const fn default_swarm_port() -> u16 {
    DEFAULT_SWARM_PORT
}

/// Swarm listeners for `port`: IPv4 first, then IPv6.
#[must_use]
pub fn swarm_addresses(port: u16) -> Vec<Multiaddr> {
    vec![
        Multiaddr::ip4(Ipv4Addr::UNSPECIFIED, port),
        Multiaddr::ip6(Ipv6Addr::UNSPECIFIED, port),
    ]
}

/// Default repository directory under the user's data directory.
#[must_use]
pub fn default_repo_path() -> Utf8PathBuf {
    let mut base = data_dir()
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        .unwrap_or_else(fallback_base_directory);
    base.push("orion");
    base.push("ipfs-repo");
    base
}

fn fallback_base_directory() -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(env::temp_dir()).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}

/// Owned default binary name, for serde.
#[must_use]
pub fn default_ipfs_binary() -> String {
    DEFAULT_IPFS_BINARY.to_owned()
}

/// Owned default daemon version, for serde.
#[must_use]
pub fn default_ipfs_version() -> String {
    DEFAULT_IPFS_VERSION.to_owned()
}

/// Owned default directory URL, for serde.
#[must_use]
pub fn default_directory_url() -> String {
    DEFAULT_DIRECTORY_URL.to_owned()
}

/// Owned default log filter, for serde.
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default readiness budget in milliseconds.
#[must_use]
pub const fn default_startup_timeout_ms() -> u64 {
    DEFAULT_STARTUP_TIMEOUT_MS
}

/// Default readiness probe interval in milliseconds.
#[must_use]
pub const fn default_probe_interval_ms() -> u64 {
    DEFAULT_PROBE_INTERVAL_MS
}

/// Default single-request probe budget in milliseconds.
#[must_use]
pub const fn default_probe_timeout_ms() -> u64 {
    DEFAULT_PROBE_TIMEOUT_MS
}

/// Default directory request budget in milliseconds.
#[must_use]
pub const fn default_directory_timeout_ms() -> u64 {
    DEFAULT_DIRECTORY_TIMEOUT_MS
}
