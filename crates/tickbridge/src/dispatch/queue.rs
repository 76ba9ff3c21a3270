//! Scheduled tasks and the FIFO queue the scheduler drains each tick.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::executor::{self, CapturedOutput, ExecutionFailure, Executor};
use crate::protocol::{Command, Response};

use super::{DISPATCH_TARGET, EXECUTED_MESSAGE, EXECUTION_FAILED_MESSAGE, SHUTDOWN_MESSAGE};

/// A command waiting to run on the host execution context.
///
/// Consumed exactly once: either [`run`](Self::run) or
/// [`cancel`](Self::cancel) takes it by value and answers the submitter.
#[derive(Debug)]
pub(crate) struct ScheduledTask {
    id: u64,
    command: Command,
    reply: oneshot::Sender<Response>,
}

impl ScheduledTask {
    pub(crate) fn new(id: u64, command: Command, reply: oneshot::Sender<Response>) -> Self {
        Self { id, command, reply }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Executes the payload and sends the resulting response.
    pub(crate) fn run(self, executor: &mut dyn Executor, source: &str) {
        debug!(
            target: DISPATCH_TARGET,
            task = self.id,
            connection = %self.command.connection,
            label = self.command.label.as_deref().unwrap_or(""),
            "executing command"
        );
        let outcome = executor::execute_contained(executor, &self.command.payload);
        let response = match outcome {
            Ok(output) => success_response(source, output),
            Err(failure) => {
                warn!(
                    target: DISPATCH_TARGET,
                    task = self.id,
                    connection = %self.command.connection,
                    error = %failure,
                    "command failed"
                );
                failure_response(source, failure)
            }
        };
        self.respond(response);
    }

    /// Answers the submitter without running the payload.
    pub(crate) fn cancel(self, source: &str) {
        debug!(target: DISPATCH_TARGET, task = self.id, "command cancelled");
        self.respond(Response::error(source, SHUTDOWN_MESSAGE));
    }

    fn respond(self, response: Response) {
        if self.reply.send(response).is_err() {
            debug!(
                target: DISPATCH_TARGET,
                task = self.id,
                connection = %self.command.connection,
                "submitter went away before the response was ready"
            );
        }
    }
}

fn success_response(source: &str, output: CapturedOutput) -> Response {
    Response::ok(source, EXECUTED_MESSAGE)
        .with_output(output.stdout)
        .with_result(output.value)
}

fn failure_response(source: &str, failure: ExecutionFailure) -> Response {
    let captured = failure.output().to_owned();
    let mut message = failure.to_string();
    if message.trim().is_empty() {
        message = EXECUTION_FAILED_MESSAGE.to_owned();
    }
    Response::error(source, message).with_output(captured)
}

/// Shared FIFO of tasks awaiting the next scheduler tick.
#[derive(Debug, Clone, Default)]
pub(crate) struct TaskQueue {
    tasks: Rc<RefCell<VecDeque<ScheduledTask>>>,
}

impl TaskQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, task: ScheduledTask) {
        self.tasks.borrow_mut().push_back(task);
    }

    /// Removes and returns every task queued so far, oldest first.
    ///
    /// Tasks submitted while the snapshot runs wait for the next tick.
    pub(crate) fn take_pending(&self) -> VecDeque<ScheduledTask> {
        std::mem::take(&mut *self.tasks.borrow_mut())
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    /// Cancels every queued task, returning how many were cancelled.
    pub(crate) fn cancel_all(&self, source: &str) -> usize {
        let pending = self.take_pending();
        let count = pending.len();
        for task in pending {
            task.cancel(source);
        }
        count
    }
}
