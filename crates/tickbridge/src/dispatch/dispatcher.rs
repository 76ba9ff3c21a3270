//! Submission side of the task queue used by connection tasks.

use std::cell::Cell;
use std::rc::Rc;

use tokio::sync::oneshot;
use tracing::trace;

use crate::protocol::{Command, Response};

use super::{DISPATCH_TARGET, SHUTDOWN_MESSAGE, ScheduledTask, TaskQueue};

/// Schedules commands for the host context and awaits their responses.
///
/// Cheap to clone; every connection task holds its own handle onto the same
/// queue.
#[derive(Debug, Clone)]
pub(crate) struct Dispatcher {
    queue: TaskQueue,
    source: Rc<str>,
    next_id: Rc<Cell<u64>>,
}

impl Dispatcher {
    pub(crate) fn new(queue: TaskQueue, source: Rc<str>) -> Self {
        Self {
            queue,
            source,
            next_id: Rc::new(Cell::new(1)),
        }
    }

    /// Source label stamped on every response.
    pub(crate) fn source(&self) -> &str {
        &self.source
    }

    /// Enqueues `command` and waits for the tick that runs it.
    ///
    /// Resolves to `service shutting down` when the task is dropped without
    /// being run.
    pub(crate) async fn submit(&self, command: Command) -> Response {
        let id = self.next_id.get();
        self.next_id.set(id.wrapping_add(1));
        let (sender, receiver) = oneshot::channel();
        trace!(
            target: DISPATCH_TARGET,
            task = id,
            connection = %command.connection,
            "command scheduled"
        );
        self.queue.push(ScheduledTask::new(id, command, sender));
        receiver
            .await
            .unwrap_or_else(|_| Response::error(&*self.source, SHUTDOWN_MESSAGE))
    }
}
