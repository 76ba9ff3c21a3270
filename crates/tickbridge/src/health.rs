//! Structured health reporting for service lifecycle events.

use std::net::SocketAddr;
use std::sync::Arc;

use tickbridge_config::Config;

use crate::bootstrap::BootstrapError;
use crate::scheduler::OperatingMode;
use crate::service::ServiceError;
use crate::transport::ConnectionId;

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once the listener is bound and the tick driver attached.
    fn service_started(&self, address: SocketAddr, mode: OperatingMode);

    /// Invoked when `start()` fails.
    fn service_start_failed(&self, error: &ServiceError);

    /// Invoked after the service has stopped.
    fn service_stopped(&self, port: u16);

    /// Invoked when a client connection is accepted.
    fn connection_opened(&self, id: ConnectionId, peer: SocketAddr);

    /// Invoked when a client connection leaves the registry.
    fn connection_closed(&self, id: ConnectionId, peer: SocketAddr);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn service_started(&self, address: SocketAddr, mode: OperatingMode) {
        (**self).service_started(address, mode);
    }

    fn service_start_failed(&self, error: &ServiceError) {
        (**self).service_start_failed(error);
    }

    fn service_stopped(&self, port: u16) {
        (**self).service_stopped(port);
    }

    fn connection_opened(&self, id: ConnectionId, peer: SocketAddr) {
        (**self).connection_opened(id, peer);
    }

    fn connection_closed(&self, id: ConnectionId, peer: SocketAddr) {
        (**self).connection_closed(id, peer);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: "tickbridge::health",
            event = "bootstrap_starting",
            "starting command server bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: "tickbridge::health",
            event = "bootstrap_succeeded",
            endpoint = %config.endpoint(),
            auto_start = config.auto_start,
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            "command server bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: "tickbridge::health",
            event = "bootstrap_failed",
            error = %error,
            "command server bootstrap failed"
        );
    }

    fn service_started(&self, address: SocketAddr, mode: OperatingMode) {
        tracing::info!(
            target: "tickbridge::health",
            event = "service_started",
            address = %address,
            mode = %mode,
            "command server listening"
        );
    }

    fn service_start_failed(&self, error: &ServiceError) {
        tracing::error!(
            target: "tickbridge::health",
            event = "service_start_failed",
            error = %error,
            "command server failed to start"
        );
    }

    fn service_stopped(&self, port: u16) {
        tracing::info!(
            target: "tickbridge::health",
            event = "service_stopped",
            port,
            "command server stopped"
        );
    }

    fn connection_opened(&self, id: ConnectionId, peer: SocketAddr) {
        tracing::debug!(
            target: "tickbridge::health",
            event = "connection_opened",
            connection = %id,
            peer = %peer,
            "client connected"
        );
    }

    fn connection_closed(&self, id: ConnectionId, peer: SocketAddr) {
        tracing::debug!(
            target: "tickbridge::health",
            event = "connection_closed",
            connection = %id,
            peer = %peer,
            "client disconnected"
        );
    }
}
