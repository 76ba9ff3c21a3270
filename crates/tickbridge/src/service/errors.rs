//! Errors returned by the service lifecycle controller.

use std::io;

use thiserror::Error;

use crate::transport::ListenerError;

/// Failures reported by [`Service::start`](super::Service::start).
#[derive(Debug, Error)]
pub enum ServiceError {
    /// `start()` was called while the service was already listening.
    #[error("command server is already running on port {port}")]
    AlreadyRunning {
        /// Port the running listener is bound to.
        port: u16,
    },
    /// The listener could not be bound; the service stays stopped.
    #[error("failed to bind command listener: {source}")]
    Bind {
        /// Underlying listener error.
        #[source]
        source: ListenerError,
    },
    /// The async runtime could not be created.
    #[error("failed to build event loop: {source}")]
    Runtime {
        /// Underlying runtime error.
        #[source]
        source: io::Error,
    },
}
