use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// What to do when a daemon is already answering on the default API address.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ExistingNodePolicy {
    /// Ask the user each time.
    #[default]
    Ask,
    /// Use the running daemon without asking.
    Adopt,
    /// Start a private daemon on the alternate ports without asking.
    Reject,
}

/// Error returned when an [`ExistingNodePolicy`] cannot be parsed.
pub type ExistingNodePolicyParseError = strum::ParseError;
