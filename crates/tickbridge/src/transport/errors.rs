//! Error types for the TCP listener and accepted connections.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Errors surfaced while binding the command listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The configured host could not be resolved.
    #[error("failed to resolve TCP address {host}:{port}: {source}")]
    Resolve {
        /// Configured bind host.
        host: String,
        /// Configured port.
        port: u16,
        /// Resolver error.
        #[source]
        source: io::Error,
    },
    /// Resolution succeeded but produced no addresses.
    #[error("no TCP addresses resolved for {host}:{port}")]
    ResolveEmpty {
        /// Configured bind host.
        host: String,
        /// Configured port.
        port: u16,
    },
    /// The port is unavailable.
    #[error("failed to bind TCP listener at {addr}: {source}")]
    BindTcp {
        /// Address the bind was attempted on.
        addr: SocketAddr,
        /// Operating system error.
        #[source]
        source: io::Error,
    },
    /// The bound socket could not be inspected.
    #[error("failed to read listener address: {source}")]
    LocalAddr {
        /// Operating system error.
        #[source]
        source: io::Error,
    },
    /// The socket could not be switched to non-blocking mode.
    #[error("failed to enable non-blocking listener: {source}")]
    NonBlocking {
        /// Operating system error.
        #[source]
        source: io::Error,
    },
    /// The socket could not be registered with the event loop.
    #[error("failed to register listener with the event loop: {source}")]
    Register {
        /// Reactor registration error.
        #[source]
        source: io::Error,
    },
}

/// Failures that close a single connection.
#[derive(Debug, Error)]
pub enum ConnectionFault {
    /// Reading from the socket failed.
    #[error("failed to read from connection: {source}")]
    Read {
        /// Socket error.
        #[source]
        source: io::Error,
    },
    /// Writing a response failed.
    #[error("failed to write response: {source}")]
    Write {
        /// Socket error.
        #[source]
        source: io::Error,
    },
    /// A response could not be serialized.
    #[error("failed to encode response: {source}")]
    Encode {
        /// Serialization error.
        #[source]
        source: serde_json::Error,
    },
}
