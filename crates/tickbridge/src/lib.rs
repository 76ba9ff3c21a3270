//! In-process command server for a single-threaded 3D host application.
//!
//! External tools connect over TCP and send JSON requests carrying code. The
//! server frames each request, schedules it onto the host's own execution
//! context and answers with a JSON response on the same persistent
//! connection:
//!
//! ```json
//! {"message":"add numbers","code":"1+1"}
//! {"response":"OK","message":"command executed","source":"tcp://127.0.0.1:6688","result":2}
//! ```
//!
//! The host's scripting API is non-reentrant, so nothing here runs on a
//! background thread. A current-thread async runtime is advanced one
//! iteration at a time by a [`TickDriver`]: [`InteractiveDriver`] hooks a
//! recurring host timer, while [`HeadlessDriver`] is pumped by the embedding
//! when the host has no UI loop. Payloads run through the host-supplied
//! [`Executor`], one at a time, in arrival order.
//!
//! The embedding owns exactly one [`Service`], usually built through
//! [`bootstrap_with`], and controls it with [`Service::start`],
//! [`Service::stop`] and [`Service::status`].

mod bootstrap;
mod dispatch;
mod executor;
mod health;
mod protocol;
mod scheduler;
mod service;
mod telemetry;
mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use executor::{
    CapturedOutput, ExecutionFailure, Executor, InterpreterError, ProcessExecutor,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use protocol::{Command, CommandRequest, ProtocolError, Response, ResponseStatus};
pub use scheduler::{
    AdapterState, HeadlessDriver, HostTimers, InteractiveDriver, OperatingMode, PumpReport,
    TickDriver, TickHandle, TickOutcome, TimerCallback, select_driver,
};
pub use service::{Service, ServiceError, ServiceStatus};
pub use telemetry::{SubscriberOwner, TelemetryError, TelemetryHandle};
pub use transport::{ConnectionFault, ConnectionId, ListenerError};

#[cfg(test)]
mod tests;
