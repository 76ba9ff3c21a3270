//! Adapter registration state and host operating modes.

use std::fmt;

use serde::Serialize;

/// Registration state of the scheduler adapter.
///
/// Moves `Unregistered → Registered` on start, `Registered → Running` on the
/// first driven iteration, and back to `Unregistered` on stop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterState {
    /// No event loop exists.
    #[default]
    Unregistered,
    /// The event loop exists and a tick driver is attached.
    Registered,
    /// At least one iteration has been driven.
    Running,
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unregistered => "unregistered",
            Self::Registered => "registered",
            Self::Running => "running",
        })
    }
}

/// How the host drives the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    /// The host owns a UI loop and fires recurring timer callbacks.
    Interactive,
    /// No UI loop; the embedding pumps the scheduler itself.
    Headless,
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Interactive => "interactive",
            Self::Headless => "headless",
        })
    }
}
