//! TCP transport for the command server.
//!
//! The listener binds synchronously so that an unavailable port is reported
//! straight from `start()`. Accepting, reading and writing then happen on the
//! scheduler's local task set: one task accepts, and each accepted socket gets
//! its own task that reads frames, submits commands and writes responses.

mod connection;
mod errors;
mod listener;
mod registry;

use std::time::Duration;

use tickbridge_config::Config;

use crate::dispatch::Dispatcher;

pub(crate) use self::connection::FramedConnection;
pub use self::errors::{ConnectionFault, ListenerError};
pub(crate) use self::listener::{BoundListener, accept_loop};
pub use self::registry::ConnectionId;
pub(crate) use self::registry::ConnectionRegistry;

const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");

/// Per-connection limits taken from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ConnectionSettings {
    pub(crate) partial_frame_timeout: Duration,
    pub(crate) max_frame_bytes: usize,
}

impl ConnectionSettings {
    pub(crate) fn from_config(config: &Config) -> Self {
        Self {
            partial_frame_timeout: config.partial_frame_timeout(),
            max_frame_bytes: config.max_frame_bytes,
        }
    }
}

/// Everything an accepted connection needs to serve requests.
#[derive(Debug, Clone)]
pub(crate) struct ConnectionContext {
    pub(crate) dispatcher: Dispatcher,
    pub(crate) registry: ConnectionRegistry,
    pub(crate) settings: ConnectionSettings,
}
