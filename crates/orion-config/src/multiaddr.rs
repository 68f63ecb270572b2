use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Network location component of a [`Multiaddr`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MultiaddrHost {
    /// Literal IPv4 address (`/ip4/...`).
    Ip4(Ipv4Addr),
    /// Literal IPv6 address (`/ip6/...`).
    Ip6(Ipv6Addr),
    /// Host name resolved at connect time (`/dns`, `/dns4`, `/dns6`).
    Dns {
        /// Protocol tag as written in the address.
        protocol: DnsProtocol,
        /// Host name.
        name: String,
    },
}

/// DNS flavour recorded in a `/dns*` multiaddr component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DnsProtocol {
    /// `/dns/<name>`.
    Any,
    /// `/dns4/<name>`.
    V4,
    /// `/dns6/<name>`.
    V6,
}

impl DnsProtocol {
    const fn tag(self) -> &'static str {
        match self {
            Self::Any => "dns",
            Self::V4 => "dns4",
            Self::V6 => "dns6",
        }
    }
}

/// TCP endpoint expressed as a multiaddress, e.g. `/ip4/127.0.0.1/tcp/5001`.
///
/// Only the host + TCP port shapes used for daemon listeners are modelled;
/// peer addresses carrying `/p2p/...` suffixes are handled as opaque strings
/// elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct Multiaddr {
    host: MultiaddrHost,
    port: u16,
}

impl Multiaddr {
    /// Builds an `/ip4/.../tcp/...` address.
    #[must_use]
    pub const fn ip4(address: Ipv4Addr, port: u16) -> Self {
        Self {
            host: MultiaddrHost::Ip4(address),
            port,
        }
    }

    /// Builds an `/ip6/.../tcp/...` address.
    #[must_use]
    pub const fn ip6(address: Ipv6Addr, port: u16) -> Self {
        Self {
            host: MultiaddrHost::Ip6(address),
            port,
        }
    }

    /// Host component.
    #[must_use]
    pub const fn host(&self) -> &MultiaddrHost {
        &self.host
    }

    /// TCP port component.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns a copy of the address listening on `port`.
    #[must_use]
    pub fn with_port(&self, port: u16) -> Self {
        Self {
            host: self.host.clone(),
            port,
        }
    }

    /// Returns a copy whose port is moved up by `offset`.
    pub fn shifted(&self, offset: u16) -> Result<Self, MultiaddrError> {
        let port = self
            .port
            .checked_add(offset)
            .ok_or_else(|| MultiaddrError::PortOverflow {
                address: self.to_string(),
                offset,
            })?;
        Ok(self.with_port(port))
    }

    /// HTTP base URL for reaching a listener bound to this address.
    ///
    /// Wildcard binds (`0.0.0.0`, `::`) are dialled on the loopback
    /// interface.
    pub fn http_url(&self) -> Result<Url, MultiaddrError> {
        let host = match &self.host {
            MultiaddrHost::Ip4(ip) if ip.is_unspecified() => Ipv4Addr::LOCALHOST.to_string(),
            MultiaddrHost::Ip4(ip) => ip.to_string(),
            MultiaddrHost::Ip6(ip) if ip.is_unspecified() => format!("[{}]", Ipv6Addr::LOCALHOST),
            MultiaddrHost::Ip6(ip) => format!("[{ip}]"),
            MultiaddrHost::Dns { name, .. } => name.clone(),
        };
        let text = format!("http://{host}:{}/", self.port);
        Url::parse(&text).map_err(|source| MultiaddrError::Url {
            address: self.to_string(),
            source,
        })
    }

    /// IP address of the host component, when it is a literal.
    #[must_use]
    pub const fn ip(&self) -> Option<IpAddr> {
        match self.host {
            MultiaddrHost::Ip4(ip) => Some(IpAddr::V4(ip)),
            MultiaddrHost::Ip6(ip) => Some(IpAddr::V6(ip)),
            MultiaddrHost::Dns { .. } => None,
        }
    }
}

impl fmt::Display for Multiaddr {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            MultiaddrHost::Ip4(ip) => write!(formatter, "/ip4/{ip}/tcp/{}", self.port),
            MultiaddrHost::Ip6(ip) => write!(formatter, "/ip6/{ip}/tcp/{}", self.port),
            MultiaddrHost::Dns { protocol, name } => {
                write!(formatter, "/{}/{name}/tcp/{}", protocol.tag(), self.port)
            }
        }
    }
}

impl FromStr for Multiaddr {
    type Err = MultiaddrError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Err(MultiaddrError::MissingLeadingSlash(input.to_owned()));
        };
        let parts: Vec<&str> = rest.split('/').collect();
        let [protocol, host, transport, port] = parts.as_slice() else {
            return Err(MultiaddrError::UnsupportedShape(input.to_owned()));
        };
        if *transport != "tcp" {
            return Err(MultiaddrError::UnsupportedTransport((*transport).to_owned()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| MultiaddrError::InvalidPort(input.to_owned()))?;
        let host = parse_host(protocol, host, input)?;
        Ok(Self { host, port })
    }
}

fn parse_host(protocol: &str, host: &str, input: &str) -> Result<MultiaddrHost, MultiaddrError> {
    let invalid = || MultiaddrError::InvalidHost(input.to_owned());
    match protocol {
        "ip4" => host.parse().map(MultiaddrHost::Ip4).map_err(|_| invalid()),
        "ip6" => host.parse().map(MultiaddrHost::Ip6).map_err(|_| invalid()),
        "dns" | "dns4" | "dns6" if !host.is_empty() => Ok(MultiaddrHost::Dns {
            protocol: match protocol {
                "dns4" => DnsProtocol::V4,
                "dns6" => DnsProtocol::V6,
                _ => DnsProtocol::Any,
            },
            name: host.to_owned(),
        }),
        "dns" | "dns4" | "dns6" => Err(invalid()),
        other => Err(MultiaddrError::UnsupportedProtocol(other.to_owned())),
    }
}

impl TryFrom<String> for Multiaddr {
    type Error = MultiaddrError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Multiaddr> for String {
    fn from(value: Multiaddr) -> Self {
        value.to_string()
    }
}

/// Errors encountered while parsing or deriving a [`Multiaddr`].
#[derive(Debug, Error)]
pub enum MultiaddrError {
    /// Multiaddrs always start with `/`.
    #[error("multiaddr '{0}' must start with '/'")]
    MissingLeadingSlash(String),
    /// Only `/<proto>/<host>/tcp/<port>` is supported.
    #[error("unsupported multiaddr shape '{0}'; expected /<proto>/<host>/tcp/<port>")]
    UnsupportedShape(String),
    /// Network protocol was not recognised.
    #[error("unsupported multiaddr protocol '{0}'")]
    UnsupportedProtocol(String),
    /// Transport other than TCP.
    #[error("unsupported multiaddr transport '{0}'")]
    UnsupportedTransport(String),
    /// Host literal failed to parse.
    #[error("invalid host in multiaddr '{0}'")]
    InvalidHost(String),
    /// Port failed to parse.
    #[error("invalid port in multiaddr '{0}'")]
    InvalidPort(String),
    /// Shifting the port would overflow.
    #[error("cannot shift port of {address} by {offset}")]
    PortOverflow {
        /// Address being shifted.
        address: String,
        /// Requested offset.
        offset: u16,
    },
    /// Building the HTTP URL failed.
    #[error("cannot derive an HTTP URL from {address}: {source}")]
    Url {
        /// Address being converted.
        address: String,
        /// Underlying parse error.
        #[source]
        source: url::ParseError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/ip4/127.0.0.1/tcp/5001")]
    #[case("/ip6/::/tcp/4001")]
    #[case("/dns4/node.example.org/tcp/443")]
    fn display_matches_parsed_text(#[case] text: &str) {
        let address: Multiaddr = text.parse().expect("valid multiaddr");
        assert_eq!(address.to_string(), text);
    }

    #[rstest]
    #[case("ip4/127.0.0.1/tcp/5001")]
    #[case("/ip4/127.0.0.1/udp/5001")]
    #[case("/ip4/not-an-ip/tcp/5001")]
    #[case("/ip4/127.0.0.1/tcp/99999")]
    #[case("/unix/tmp/socket")]
    fn rejects_unsupported_addresses(#[case] text: &str) {
        assert!(text.parse::<Multiaddr>().is_err(), "{text} should be rejected");
    }

    #[test]
    fn shifted_moves_only_the_port() {
        let address: Multiaddr = "/ip4/127.0.0.1/tcp/5001".parse().expect("valid");
        let shifted = address.shifted(100).expect("no overflow");
        assert_eq!(shifted.to_string(), "/ip4/127.0.0.1/tcp/5101");
    }

    #[test]
    fn shifted_reports_overflow() {
        let address = Multiaddr::ip4(Ipv4Addr::LOCALHOST, u16::MAX);
        assert!(matches!(
            address.shifted(1),
            Err(MultiaddrError::PortOverflow { offset: 1, .. })
        ));
    }

    #[rstest]
    #[case("/ip4/127.0.0.1/tcp/5001", "http://127.0.0.1:5001/")]
    #[case("/ip4/0.0.0.0/tcp/5001", "http://127.0.0.1:5001/")]
    #[case("/ip6/::/tcp/5001", "http://[::1]:5001/")]
    #[case("/dns/localhost/tcp/5001", "http://localhost:5001/")]
    fn http_url_dials_reachable_host(#[case] text: &str, #[case] expected: &str) {
        let address: Multiaddr = text.parse().expect("valid");
        assert_eq!(address.http_url().expect("url").as_str(), expected);
    }
}
