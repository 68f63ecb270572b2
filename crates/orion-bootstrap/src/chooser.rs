//! Decision seam for a daemon that is already running.

use async_trait::async_trait;

/// A daemon found answering on the API address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingNode {
    /// Version the daemon reported.
    pub version: String,
    /// Version the application was built against.
    pub expected_version: String,
}

impl ExistingNode {
    /// True when the reported and expected versions agree.
    #[must_use]
    pub fn version_matches(&self) -> bool {
        self.version == self.expected_version
    }

    /// Note shown to the user when the versions differ.
    #[must_use]
    pub fn advisory(&self) -> Option<String> {
        (!self.version_matches()).then(|| {
            format!(
                "Please note: Orion was designed with IPFS {}, while the available API is running {}.",
                self.expected_version, self.version
            )
        })
    }
}

/// Outcome of the adopt-or-reject decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeChoice {
    /// Use the running daemon as is.
    Adopt,
    /// Run a private daemon on alternate ports.
    Reject,
}

/// Decides what to do with an already-running daemon.
#[async_trait]
pub trait NodeChooser: Send + Sync {
    /// Returns the choice for `node`.
    async fn choose(&self, node: &ExistingNode) -> NodeChoice;
}

/// Chooser that always answers the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedChooser(NodeChoice);

impl FixedChooser {
    /// Always answers `choice`.
    #[must_use]
    pub const fn new(choice: NodeChoice) -> Self {
        Self(choice)
    }
}

#[async_trait]
impl NodeChooser for FixedChooser {
    async fn choose(&self, node: &ExistingNode) -> NodeChoice {
        tracing::info!(
            target: concat!(env!("CARGO_PKG_NAME"), "::chooser"),
            version = %node.version,
            choice = ?self.0,
            "existing daemon handled by fixed policy"
        );
        self.0
    }
}
