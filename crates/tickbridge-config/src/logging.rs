//! Log output format selection.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How log records are rendered on standard error.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event, fields flattened, never coloured.
    #[default]
    Json,
    /// Single-line text for an operator watching the host's console.
    Compact,
}

impl LogFormat {
    /// Whether ANSI colour may be used when standard error is a terminal.
    ///
    /// Structured output stays machine-readable even on a console.
    #[must_use]
    pub const fn allows_colour(self) -> bool {
        matches!(self, Self::Compact)
    }
}

/// Error returned when text names no known [`LogFormat`].
pub type LogFormatParseError = strum::ParseError;
