//! Service lifecycle controller.
//!
//! A [`Service`] owns the listener, the scheduler event loop and the tick
//! driver for one embedding. It is created stopped; [`Service::start`] binds
//! and attaches, [`Service::stop`] tears everything down and may be called any
//! number of times.

mod errors;
mod status;

use std::cell::RefCell;
use std::fmt;
use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use tickbridge_config::{Config, Endpoint};
use tokio::task::AbortHandle;
use tracing::info;

use crate::dispatch::{Dispatcher, TaskQueue};
use crate::executor::Executor;
use crate::health::HealthReporter;
use crate::scheduler::{AdapterState, EventLoop, PumpReport, TickDriver, TickHandle};
use crate::transport::{
    BoundListener, ConnectionContext, ConnectionRegistry, ConnectionSettings, accept_loop,
};

pub use self::errors::ServiceError;
pub use self::status::ServiceStatus;

const SERVICE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::service");

/// The in-process command server.
pub struct Service {
    config: Config,
    port: u16,
    driver: Box<dyn TickDriver>,
    executor: Rc<RefCell<Box<dyn Executor>>>,
    reporter: Arc<dyn HealthReporter>,
    running: Option<Running>,
}

struct Running {
    event_loop: Rc<EventLoop>,
    registry: ConnectionRegistry,
    listener: AbortHandle,
    address: SocketAddr,
    endpoint: Endpoint,
}

impl Service {
    /// Creates a stopped service.
    #[must_use]
    pub fn new(
        config: &Config,
        driver: Box<dyn TickDriver>,
        executor: Box<dyn Executor>,
        reporter: Arc<dyn HealthReporter>,
    ) -> Self {
        Self {
            config: config.clone(),
            port: config.port,
            driver,
            executor: Rc::new(RefCell::new(executor)),
            reporter,
            running: None,
        }
    }

    /// Configuration the service was created with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Binds the listener and attaches the tick driver.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::AlreadyRunning`] when already started and
    /// [`ServiceError::Bind`] when the port is unavailable. On error the
    /// service is left stopped.
    pub fn start(&mut self) -> Result<(), ServiceError> {
        if let Some(running) = &self.running {
            return Err(ServiceError::AlreadyRunning {
                port: running.endpoint.port,
            });
        }
        match self.launch() {
            Ok(running) => {
                info!(
                    target: SERVICE_TARGET,
                    source = %running.endpoint,
                    mode = %self.driver.mode(),
                    "command server started"
                );
                self.reporter
                    .service_started(running.address, self.driver.mode());
                self.running = Some(running);
                Ok(())
            }
            Err(error) => {
                self.reporter.service_start_failed(&error);
                Err(error)
            }
        }
    }

    fn launch(&mut self) -> Result<Running, ServiceError> {
        let requested = self.config.endpoint().with_port(self.port);
        let bound =
            BoundListener::bind(&requested).map_err(|source| ServiceError::Bind { source })?;
        let address = bound.local_addr();
        let endpoint = requested.with_port(address.port());
        let source: Rc<str> = Rc::from(endpoint.to_string());

        let queue = TaskQueue::new();
        let event_loop = EventLoop::new(
            queue.clone(),
            Rc::clone(&self.executor),
            Rc::clone(&source),
        )
        .map_err(|source| ServiceError::Runtime { source })?;
        let listener = event_loop
            .adopt_listener(bound)
            .map_err(|source| ServiceError::Bind { source })?;

        let registry = ConnectionRegistry::new(Arc::clone(&self.reporter));
        let context = ConnectionContext {
            dispatcher: Dispatcher::new(queue, source),
            registry: registry.clone(),
            settings: ConnectionSettings::from_config(&self.config),
        };
        let listener = event_loop
            .spawn(accept_loop(listener, context))
            .abort_handle();

        let event_loop = Rc::new(event_loop);
        self.driver.attach(TickHandle::new(&event_loop));
        Ok(Running {
            event_loop,
            registry,
            listener,
            address,
            endpoint,
        })
    }

    /// Stops the service. Calling it while stopped does nothing.
    ///
    /// Queued commands are answered with `service shutting down`, every
    /// connection is closed and the port is released.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        self.driver.detach();
        running
            .event_loop
            .shutdown(&running.registry, &running.listener);
        let port = running.endpoint.port;
        drop(running);
        info!(target: SERVICE_TARGET, port, "command server stopped");
        self.reporter.service_stopped(port);
    }

    /// Returns true while the listener is bound.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Sets the port used by the next [`start`](Self::start).
    pub fn set_port(&mut self, port: u16) {
        self.port = port;
        if self.running.is_some() {
            info!(
                target: SERVICE_TARGET,
                port,
                "port change takes effect on next start"
            );
        }
    }

    /// Port the next start will bind.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Snapshot of the service state.
    #[must_use]
    pub fn status(&self) -> ServiceStatus {
        let mode = self.driver.mode();
        match &self.running {
            Some(running) => ServiceStatus {
                running: true,
                port: running.endpoint.port,
                address: Some(running.endpoint.to_string()),
                connection_count: running.registry.len(),
                pending_tasks: running.event_loop.pending_tasks(),
                adapter_state: running.event_loop.state(),
                mode,
            },
            None => ServiceStatus {
                running: false,
                port: self.port,
                address: None,
                connection_count: 0,
                pending_tasks: 0,
                adapter_state: AdapterState::Unregistered,
                mode,
            },
        }
    }

    /// Drives the scheduler through the attached driver for up to `budget`.
    ///
    /// Only headless drivers do work here; interactive drivers are advanced
    /// by host timers.
    pub fn pump(&mut self, budget: Duration) -> PumpReport {
        self.driver.pump(budget)
    }

    /// Runs a single scheduler iteration directly. Returns false when stopped.
    pub fn drive_once(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| running.event_loop.drive_one_iteration())
    }

    /// Handle for advancing the scheduler from host code, while running.
    #[must_use]
    pub fn tick_handle(&self) -> Option<TickHandle> {
        self.running
            .as_ref()
            .map(|running| TickHandle::new(&running.event_loop))
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        self.stop();
    }
}
