//! Hand-off between connection tasks and the host execution context.
//!
//! Connection tasks never execute payloads. They submit a [`Command`] to the
//! [`Dispatcher`], which parks it on the shared [`TaskQueue`] and suspends
//! until the scheduler tick has run it and replied.
//!
//! [`Command`]: crate::protocol::Command

mod dispatcher;
mod queue;

pub(crate) use self::dispatcher::Dispatcher;
pub(crate) use self::queue::{ScheduledTask, TaskQueue};

const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Message carried by successful responses.
pub(crate) const EXECUTED_MESSAGE: &str = "command executed";

/// Message sent when a task is cancelled before it runs.
pub(crate) const SHUTDOWN_MESSAGE: &str = "service shutting down";

/// Fallback message for failures that carry no text of their own.
pub(crate) const EXECUTION_FAILED_MESSAGE: &str = "execution failed";
