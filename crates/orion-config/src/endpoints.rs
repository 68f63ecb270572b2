//! Addresses and paths describing the daemon the application talks to.

use camino::{Utf8Path, Utf8PathBuf};

use crate::Config;
use crate::defaults::{ALTERNATE_PORT_OFFSET, swarm_addresses};
use crate::multiaddr::{Multiaddr, MultiaddrError};

/// Listen addresses, repository and executable for one application run.
///
/// The record is never edited in place. When a foreign daemon already owns
/// the default ports the owner swaps it for [`EndpointConfig::alternate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    api: Multiaddr,
    gateway: Multiaddr,
    swarm: Vec<Multiaddr>,
    repo_path: Utf8PathBuf,
    binary_path: Utf8PathBuf,
}

impl EndpointConfig {
    /// Assembles an endpoint set from explicit parts.
    #[must_use]
    pub const fn new(
        api: Multiaddr,
        gateway: Multiaddr,
        swarm: Vec<Multiaddr>,
        repo_path: Utf8PathBuf,
        binary_path: Utf8PathBuf,
    ) -> Self {
        Self {
            api,
            gateway,
            swarm,
            repo_path,
            binary_path,
        }
    }

    /// Derives the endpoint set described by the loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.api_address().clone(),
            config.gateway_address().clone(),
            swarm_addresses(config.swarm_port()),
            config.repo_path(),
            Utf8PathBuf::from(config.ipfs_binary()),
        )
    }

    /// Endpoint set for a private daemon running beside a foreign one.
    ///
    /// Every listener port moves up by [`ALTERNATE_PORT_OFFSET`]; repository
    /// and executable stay the same.
    pub fn alternate(&self) -> Result<Self, MultiaddrError> {
        let swarm = self
            .swarm
            .iter()
            .map(|address| address.shifted(ALTERNATE_PORT_OFFSET))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            api: self.api.shifted(ALTERNATE_PORT_OFFSET)?,
            gateway: self.gateway.shifted(ALTERNATE_PORT_OFFSET)?,
            swarm,
            repo_path: self.repo_path.clone(),
            binary_path: self.binary_path.clone(),
        })
    }

    /// HTTP API listener.
    #[must_use]
    pub const fn api(&self) -> &Multiaddr {
        &self.api
    }

    /// HTTP gateway listener.
    #[must_use]
    pub const fn gateway(&self) -> &Multiaddr {
        &self.gateway
    }

    /// Swarm listeners in declaration order.
    #[must_use]
    pub fn swarm(&self) -> &[Multiaddr] {
        &self.swarm
    }

    /// On-disk repository directory.
    #[must_use]
    pub fn repo_path(&self) -> &Utf8Path {
        &self.repo_path
    }

    /// Daemon executable.
    #[must_use]
    pub fn binary_path(&self) -> &Utf8Path {
        &self.binary_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::{default_api_address, default_gateway_address, default_swarm_port};

    fn defaults() -> EndpointConfig {
        EndpointConfig::new(
            default_api_address(),
            default_gateway_address(),
            swarm_addresses(default_swarm_port()),
            Utf8PathBuf::from("/var/lib/orion/ipfs-repo"),
            Utf8PathBuf::from("ipfs"),
        )
    }

    #[test]
    fn alternate_uses_designated_ports() {
        let alternate = defaults().alternate().expect("alternate endpoints");
        assert_eq!(alternate.api().to_string(), "/ip4/127.0.0.1/tcp/5101");
        assert_eq!(alternate.gateway().to_string(), "/ip4/127.0.0.1/tcp/8180");
        let swarm: Vec<String> = alternate.swarm().iter().map(ToString::to_string).collect();
        assert_eq!(swarm, vec!["/ip4/0.0.0.0/tcp/4101", "/ip6/::/tcp/4101"]);
    }

    #[test]
    fn alternate_differs_from_defaults_in_every_address() {
        let original = defaults();
        let alternate = original.alternate().expect("alternate endpoints");
        assert_ne!(alternate.api(), original.api());
        assert_ne!(alternate.gateway(), original.gateway());
        assert_eq!(alternate.swarm().len(), original.swarm().len());
        for (shifted, base) in alternate.swarm().iter().zip(original.swarm()) {
            assert_ne!(shifted, base);
        }
        let mut all = vec![alternate.api(), alternate.gateway()];
        all.extend(alternate.swarm());
        let mut defaults_all = vec![original.api(), original.gateway()];
        defaults_all.extend(original.swarm());
        for address in &all {
            assert!(!defaults_all.contains(address), "{address} collides");
        }
    }

    #[test]
    fn alternate_keeps_repository_and_binary() {
        let original = defaults();
        let alternate = original.alternate().expect("alternate endpoints");
        assert_eq!(alternate.repo_path(), original.repo_path());
        assert_eq!(alternate.binary_path(), original.binary_path());
    }
}
