use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How Orion renders startup events on stderr.
///
/// Set with `--log-format`, `ORION_LOG_FORMAT` or `log_format` in the
/// configuration file. Names match case-insensitively.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// JSON lines with event fields at the top level, for service managers.
    #[default]
    Json,
    /// Terse text lines for an operator watching the node come up.
    Compact,
}

impl LogFormat {
    /// True when events are emitted as machine-readable records.
    #[must_use]
    pub const fn is_structured(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Error returned when a [`LogFormat`] name is not recognised.
pub type LogFormatParseError = strum::ParseError;
