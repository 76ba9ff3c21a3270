//! Point-in-time snapshot of the service.

use serde::Serialize;

use crate::scheduler::{AdapterState, OperatingMode};

/// Snapshot returned by [`Service::status`](super::Service::status).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    /// Whether the listener is bound and accepting.
    pub running: bool,
    /// Bound port while running; otherwise the port the next start will use.
    pub port: u16,
    /// Source label of the running listener, as `tcp://host:port`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Open client connections.
    pub connection_count: usize,
    /// Commands waiting for the next scheduler tick.
    pub pending_tasks: usize,
    /// Registration state of the scheduler adapter.
    pub adapter_state: AdapterState,
    /// Operating mode of the attached tick driver.
    pub mode: OperatingMode,
}
