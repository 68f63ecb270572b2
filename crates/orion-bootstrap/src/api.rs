//! Client for the daemon's local HTTP control API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use thiserror::Error;

use orion_config::{Multiaddr, MultiaddrError};

use crate::peers::PeerAddress;

/// Budget for peer connect and bootstrap registration calls, which dial
/// remote nodes and routinely outlast a liveness probe.
const PEER_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Operations the startup sequence needs from a running daemon.
#[async_trait]
pub trait NodeApi: Send + Sync {
    /// Reports the daemon's version string.
    async fn version(&self) -> Result<String, ApiError>;

    /// Succeeds once the daemon answers identity requests.
    async fn identity(&self) -> Result<(), ApiError>;

    /// Opens a live swarm connection to `peer`.
    async fn swarm_connect(&self, peer: &PeerAddress) -> Result<(), ApiError>;

    /// Persists `peer` in the daemon's bootstrap list.
    async fn bootstrap_add(&self, peer: &PeerAddress) -> Result<(), ApiError>;
}

/// Builds [`NodeApi`] clients for a given API multiaddr.
pub trait ApiConnector: Send + Sync {
    /// Returns a client addressing the daemon at `address`.
    fn connect(&self, address: &Multiaddr) -> Result<Arc<dyn NodeApi>, ApiError>;
}

/// Errors raised while talking to the daemon API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Nothing accepted the connection.
    #[error("no daemon API reachable at {address}: {source}")]
    Unreachable {
        /// API multiaddr that was dialled.
        address: String,
        /// Transport error.
        #[source]
        source: reqwest::Error,
    },
    /// The request did not complete within its budget.
    #[error("daemon API at {address} did not answer in time")]
    TimedOut {
        /// API multiaddr that was dialled.
        address: String,
    },
    /// The request failed for another transport reason.
    #[error("request to daemon API at {address} failed: {source}")]
    Request {
        /// API multiaddr that was dialled.
        address: String,
        /// Transport error.
        #[source]
        source: reqwest::Error,
    },
    /// The daemon answered with an error status.
    #[error("daemon API at {address} rejected the request ({status}): {message}")]
    Rejected {
        /// API multiaddr that was dialled.
        address: String,
        /// HTTP status code.
        status: u16,
        /// Message reported by the daemon.
        message: String,
    },
    /// The response body was not understood.
    #[error("unexpected response from daemon API at {address}: {source}")]
    Decode {
        /// API multiaddr that was dialled.
        address: String,
        /// Decoding error.
        #[source]
        source: reqwest::Error,
    },
    /// The API multiaddr cannot be dialled over HTTP.
    #[error(transparent)]
    Address(#[from] MultiaddrError),
    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {source}")]
    Client {
        /// Builder error.
        #[source]
        source: reqwest::Error,
    },
}

impl ApiError {
    /// True when the error means nothing is listening (or answering) at all.
    #[must_use]
    pub const fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::TimedOut { .. })
    }
}

/// [`ApiConnector`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpApiConnector {
    client: Client,
}

impl HttpApiConnector {
    /// Builds a connector whose requests time out after `request_timeout`.
    pub fn new(request_timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|source| ApiError::Client { source })?;
        Ok(Self { client })
    }
}

impl ApiConnector for HttpApiConnector {
    fn connect(&self, address: &Multiaddr) -> Result<Arc<dyn NodeApi>, ApiError> {
        let base = address.http_url()?;
        Ok(Arc::new(HttpNodeApi {
            client: self.client.clone(),
            base: base.to_string(),
            address: address.to_string(),
        }))
    }
}

/// `reqwest` implementation of [`NodeApi`] for a single daemon.
#[derive(Debug, Clone)]
struct HttpNodeApi {
    client: Client,
    base: String,
    address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VersionInfo {
    version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DaemonErrorBody {
    message: String,
}

impl HttpNodeApi {
    async fn post(
        &self,
        command: &str,
        argument: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<Response, ApiError> {
        // The daemon only accepts POST on its RPC endpoints.
        let mut request = self.client.post(format!("{}api/v0/{command}", self.base));
        if let Some(arg) = argument {
            request = request.query(&[("arg", arg)]);
        }
        if let Some(budget) = timeout {
            request = request.timeout(budget);
        }
        let response = request
            .send()
            .await
            .map_err(|source| self.transport_error(source))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Rejected {
            address: self.address.clone(),
            status: status.as_u16(),
            message: daemon_message(&body, status.canonical_reason()),
        })
    }

    fn transport_error(&self, source: reqwest::Error) -> ApiError {
        let address = self.address.clone();
        if source.is_timeout() {
            ApiError::TimedOut { address }
        } else if source.is_connect() {
            ApiError::Unreachable { address, source }
        } else {
            ApiError::Request { address, source }
        }
    }
}

fn daemon_message(body: &str, reason: Option<&str>) -> String {
    if let Ok(parsed) = serde_json::from_str::<DaemonErrorBody>(body) {
        return parsed.message;
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        reason.unwrap_or("no message").to_owned()
    } else {
        trimmed.to_owned()
    }
}

#[async_trait]
impl NodeApi for HttpNodeApi {
    async fn version(&self) -> Result<String, ApiError> {
        let response = self.post("version", None, None).await?;
        let info = response
            .json::<VersionInfo>()
            .await
            .map_err(|source| ApiError::Decode {
                address: self.address.clone(),
                source,
            })?;
        Ok(info.version)
    }

    async fn identity(&self) -> Result<(), ApiError> {
        self.post("id", None, None).await.map(drop)
    }

    async fn swarm_connect(&self, peer: &PeerAddress) -> Result<(), ApiError> {
        self.post(
            "swarm/connect",
            Some(peer.as_str()),
            Some(PEER_REQUEST_TIMEOUT),
        )
        .await
        .map(drop)
    }

    async fn bootstrap_add(&self, peer: &PeerAddress) -> Result<(), ApiError> {
        self.post(
            "bootstrap/add",
            Some(peer.as_str()),
            Some(PEER_REQUEST_TIMEOUT),
        )
        .await
        .map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(r#"{"Message":"repo locked","Code":0,"Type":"error"}"#, "repo locked")]
    #[case("plain failure\n", "plain failure")]
    #[case("", "Internal Server Error")]
    fn daemon_message_prefers_structured_field(#[case] body: &str, #[case] expected: &str) {
        assert_eq!(daemon_message(body, Some("Internal Server Error")), expected);
    }

    #[test]
    fn unreachable_classification_covers_timeouts() {
        let error = ApiError::TimedOut {
            address: String::from("/ip4/127.0.0.1/tcp/5001"),
        };
        assert!(error.is_unreachable());
        let rejected = ApiError::Rejected {
            address: String::from("/ip4/127.0.0.1/tcp/5001"),
            status: 500,
            message: String::from("boom"),
        };
        assert!(!rejected.is_unreachable());
    }
}
