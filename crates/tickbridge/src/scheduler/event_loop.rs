//! Single-threaded runtime driven one iteration at a time.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};
use tokio::task::{AbortHandle, JoinHandle, LocalSet};
use tracing::{debug, error, info, warn};

use crate::dispatch::TaskQueue;
use crate::executor::{Executor, panic_message};
use crate::transport::{BoundListener, ConnectionRegistry, ListenerError};

use super::{AdapterState, SCHEDULER_TARGET};

/// Scheduler passes granted to the network per poll. Each pass lets the
/// reactor deliver readiness events and wakes the tasks waiting on them.
const REACTOR_TURNS: usize = 2;

/// Upper bound on cancel-then-poll rounds while draining at shutdown. A
/// client pipelining requests faster than they are refused cannot hold the
/// shutdown open past this.
const SHUTDOWN_DRAIN_ROUNDS: usize = 16;

/// Consecutive idle drain rounds required before connections are closed.
const QUIET_ROUNDS_BEFORE_CLOSE: usize = 2;

/// Owns the runtime, local task set and the queue of pending commands.
pub(crate) struct EventLoop {
    // Dropped before the runtime so local tasks release their sockets while
    // the reactor still exists.
    local: LocalSet,
    runtime: Runtime,
    queue: TaskQueue,
    executor: Rc<RefCell<Box<dyn Executor>>>,
    source: Rc<str>,
    state: Cell<AdapterState>,
    in_tick: Cell<bool>,
    stopped: Cell<bool>,
}

impl EventLoop {
    pub(crate) fn new(
        queue: TaskQueue,
        executor: Rc<RefCell<Box<dyn Executor>>>,
        source: Rc<str>,
    ) -> io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            local: LocalSet::new(),
            runtime,
            queue,
            executor,
            source,
            state: Cell::new(AdapterState::Registered),
            in_tick: Cell::new(false),
            stopped: Cell::new(false),
        })
    }

    pub(crate) fn state(&self) -> AdapterState {
        self.state.get()
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.get()
    }

    pub(crate) fn pending_tasks(&self) -> usize {
        self.queue.len()
    }

    /// Registers a bound listener with this loop's reactor.
    pub(crate) fn adopt_listener(
        &self,
        listener: BoundListener,
    ) -> Result<tokio::net::TcpListener, ListenerError> {
        let _context = self.runtime.enter();
        listener.into_async()
    }

    /// Spawns a task on the local set; it first runs on the next poll.
    pub(crate) fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        self.local.spawn_local(future)
    }

    /// Runs one non-blocking pass: network, pending commands, network.
    ///
    /// Returns false once the loop has been shut down. Panics are logged and
    /// swallowed; re-entrant calls from inside a payload are ignored.
    pub(crate) fn drive_one_iteration(&self) -> bool {
        if self.stopped.get() {
            return false;
        }
        if self.in_tick.replace(true) {
            warn!(
                target: SCHEDULER_TARGET,
                "ignoring re-entrant scheduler iteration"
            );
            return true;
        }
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.iteration()));
        self.in_tick.set(false);
        if let Err(payload) = outcome {
            error!(
                target: SCHEDULER_TARGET,
                panic = %panic_message(payload.as_ref()),
                "scheduler iteration panicked"
            );
        }
        if self.stopped.get() {
            return false;
        }
        self.state.set(AdapterState::Running);
        true
    }

    fn iteration(&self) {
        self.poll_network();
        let mut pending = self.queue.take_pending().into_iter();
        while let Some(task) = pending.next() {
            if self.stopped.get() {
                task.cancel(&self.source);
                for task in pending.by_ref() {
                    task.cancel(&self.source);
                }
                break;
            }
            debug!(target: SCHEDULER_TARGET, task = task.id(), "running scheduled task");
            let mut executor = self.executor.borrow_mut();
            task.run(&mut **executor, &self.source);
        }
        if !self.stopped.get() {
            self.poll_network();
        }
    }

    /// Lets the network make progress for `duration` without running payloads.
    pub(crate) fn idle(&self, duration: Duration) {
        if self.stopped.get() || self.in_tick.get() {
            return;
        }
        self.in_tick.set(true);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            // `sleep` needs the runtime's timer, so build it inside `block_on`.
            self.runtime.block_on(self.local.run_until(async move {
                tokio::time::sleep(duration).await;
            }));
        }));
        self.in_tick.set(false);
        if let Err(payload) = outcome {
            error!(
                target: SCHEDULER_TARGET,
                panic = %panic_message(payload.as_ref()),
                "scheduler idle panicked"
            );
        }
    }

    fn poll_network(&self) {
        self.runtime.block_on(self.local.run_until(async {
            for _ in 0..REACTOR_TURNS {
                tokio::task::yield_now().await;
            }
        }));
    }

    /// Cancels pending work, stops accepting and closes every connection.
    ///
    /// Queued commands, including those read off the network while stopping,
    /// are answered with `service shutting down` before their sockets close.
    /// A task already executing is never interrupted.
    pub(crate) fn shutdown(&self, registry: &ConnectionRegistry, listener: &AbortHandle) {
        if self.stopped.replace(true) {
            return;
        }
        listener.abort();
        let cancelled = self.drain_pending();
        let closed = registry.close_all();
        self.poll_network();
        self.state.set(AdapterState::Unregistered);
        info!(
            target: SCHEDULER_TARGET,
            cancelled,
            closed,
            "event loop shut down"
        );
    }

    /// Refuses queued commands and lets their replies reach the network,
    /// repeating until two consecutive rounds neither refuse nor receive
    /// anything.
    fn drain_pending(&self) -> usize {
        let mut cancelled = 0;
        let mut quiet_rounds = 0;
        for _ in 0..SHUTDOWN_DRAIN_ROUNDS {
            let refused = self.queue.cancel_all(&self.source);
            cancelled += refused;
            self.poll_network();
            if refused == 0 && self.queue.is_empty() {
                quiet_rounds += 1;
                if quiet_rounds == QUIET_ROUNDS_BEFORE_CLOSE {
                    return cancelled;
                }
            } else {
                quiet_rounds = 0;
            }
        }
        let abandoned = self.queue.cancel_all(&self.source);
        if abandoned > 0 {
            warn!(
                target: SCHEDULER_TARGET,
                abandoned,
                "commands still arriving after shutdown drain"
            );
        }
        cancelled + abandoned
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        let _context = self.runtime.enter();
        drop(std::mem::take(&mut self.local));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::dispatch::Dispatcher;
    use crate::executor::{CapturedOutput, ExecutionFailure};
    use crate::health::StructuredHealthReporter;
    use crate::protocol::{Command, Response};
    use crate::transport::ConnectionId;

    const SOURCE: &str = "tcp://127.0.0.1:0";

    struct CountingRuntime {
        runs: Rc<Cell<usize>>,
    }

    impl Executor for CountingRuntime {
        fn execute(&mut self, payload: &str) -> Result<CapturedOutput, ExecutionFailure> {
            self.runs.set(self.runs.get() + 1);
            if payload == "panic" {
                panic!("payload panicked");
            }
            Ok(CapturedOutput::value(json!(self.runs.get())))
        }
    }

    struct Fixture {
        event_loop: EventLoop,
        dispatcher: Dispatcher,
        runs: Rc<Cell<usize>>,
    }

    fn fixture() -> Fixture {
        let runs = Rc::new(Cell::new(0));
        let executor: Box<dyn Executor> = Box::new(CountingRuntime {
            runs: Rc::clone(&runs),
        });
        let queue = TaskQueue::new();
        let source: Rc<str> = Rc::from(SOURCE);
        let event_loop = EventLoop::new(
            queue.clone(),
            Rc::new(RefCell::new(executor)),
            Rc::clone(&source),
        )
        .expect("build runtime");
        Fixture {
            event_loop,
            dispatcher: Dispatcher::new(queue, source),
            runs,
        }
    }

    fn submit(fixture: &Fixture, payload: &str) -> Rc<RefCell<Option<Response>>> {
        let slot = Rc::new(RefCell::new(None));
        let dispatcher = fixture.dispatcher.clone();
        let command = Command {
            label: None,
            payload: payload.to_owned(),
            connection: ConnectionId::new(1),
        };
        let target = Rc::clone(&slot);
        fixture.event_loop.spawn(async move {
            let response = dispatcher.submit(command).await;
            *target.borrow_mut() = Some(response);
        });
        slot
    }

    fn noop_listener(event_loop: &EventLoop) -> AbortHandle {
        event_loop.spawn(std::future::pending::<()>()).abort_handle()
    }

    #[test]
    fn one_iteration_runs_and_answers_a_command() {
        let fixture = fixture();
        let slot = submit(&fixture, "1+1");

        assert_eq!(fixture.event_loop.state(), AdapterState::Registered);
        assert!(fixture.event_loop.drive_one_iteration());

        let response = slot.borrow_mut().take().expect("response delivered");
        assert!(response.is_ok());
        assert_eq!(response.result, Some(json!(1)));
        assert_eq!(fixture.event_loop.state(), AdapterState::Running);
    }

    #[test]
    fn executor_panics_do_not_escape_the_tick() {
        let fixture = fixture();
        let panicking = submit(&fixture, "panic");
        let healthy = submit(&fixture, "2");

        assert!(fixture.event_loop.drive_one_iteration());

        let failed = panicking.borrow_mut().take().expect("panic answered");
        assert!(!failed.is_ok());
        assert!(failed.message.contains("payload panicked"));
        assert!(healthy.borrow().as_ref().is_some_and(Response::is_ok));
        assert_eq!(fixture.runs.get(), 2);
    }

    #[test]
    fn shutdown_cancels_queued_commands() {
        let fixture = fixture();
        let slot = submit(&fixture, "never");
        // Let the submission reach the queue without executing it.
        fixture.event_loop.poll_network();
        assert_eq!(fixture.event_loop.pending_tasks(), 1);

        let registry = ConnectionRegistry::new(Arc::new(StructuredHealthReporter::new()));
        let listener = noop_listener(&fixture.event_loop);
        fixture.event_loop.shutdown(&registry, &listener);

        let response = slot.borrow_mut().take().expect("cancellation delivered");
        assert_eq!(response.message, "service shutting down");
        assert_eq!(fixture.runs.get(), 0);
        assert_eq!(fixture.event_loop.state(), AdapterState::Unregistered);
        assert!(!fixture.event_loop.drive_one_iteration());
    }

    #[test]
    fn shutdown_answers_commands_that_arrive_while_stopping() {
        let fixture = fixture();
        // Not yet polled: the command reaches the queue during shutdown.
        let slot = submit(&fixture, "late");
        assert_eq!(fixture.event_loop.pending_tasks(), 0);

        let registry = ConnectionRegistry::new(Arc::new(StructuredHealthReporter::new()));
        let listener = noop_listener(&fixture.event_loop);
        fixture.event_loop.shutdown(&registry, &listener);

        let response = slot.borrow_mut().take().expect("cancellation delivered");
        assert!(!response.is_ok());
        assert_eq!(response.message, "service shutting down");
        assert_eq!(fixture.runs.get(), 0);
        assert_eq!(fixture.event_loop.pending_tasks(), 0);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let fixture = fixture();
        let registry = ConnectionRegistry::new(Arc::new(StructuredHealthReporter::new()));
        let listener = noop_listener(&fixture.event_loop);
        fixture.event_loop.shutdown(&registry, &listener);
        fixture.event_loop.shutdown(&registry, &listener);
        assert!(fixture.event_loop.is_stopped());
    }

    #[test]
    fn idle_lets_time_pass() {
        let fixture = fixture();
        let started = std::time::Instant::now();
        fixture.event_loop.idle(Duration::from_millis(20));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn idle_serves_connections_while_waiting() {
        let fixture = fixture();
        let slot = submit(&fixture, "1+1");

        fixture.event_loop.idle(Duration::from_millis(5));

        assert_eq!(fixture.event_loop.pending_tasks(), 1);
        assert!(slot.borrow().is_none());
        assert_eq!(fixture.runs.get(), 0);
    }
}
