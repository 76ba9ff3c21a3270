//! Execution seam between the scheduler and the host scripting runtime.
//!
//! The scheduler never interprets payloads itself. It hands each one to an
//! [`Executor`] on the host's execution context and turns the typed result
//! into a response. Hosts plug in their own runtime; [`ProcessExecutor`] is a
//! stock implementation backed by an external interpreter.

mod process;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use serde_json::Value;
use thiserror::Error;

pub use self::process::{InterpreterError, ProcessExecutor};

/// Runs command payloads against the host's live state.
///
/// Implementations are only ever called from the scheduler tick, one payload
/// at a time, so they may touch non-reentrant host APIs freely.
pub trait Executor {
    /// Executes `payload`, returning captured output or the failure it raised.
    fn execute(&mut self, payload: &str) -> Result<CapturedOutput, ExecutionFailure>;
}

impl<E: Executor + ?Sized> Executor for Box<E> {
    fn execute(&mut self, payload: &str) -> Result<CapturedOutput, ExecutionFailure> {
        (**self).execute(payload)
    }
}

/// Output collected from a successful execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapturedOutput {
    /// Text written to standard output while the payload ran.
    pub stdout: String,
    /// Serialized return value, when the runtime exposes one.
    pub value: Option<Value>,
}

impl CapturedOutput {
    /// Output consisting only of captured text.
    pub fn text(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            value: None,
        }
    }

    /// Output consisting only of a return value.
    #[must_use]
    pub fn value(value: Value) -> Self {
        Self {
            stdout: String::new(),
            value: Some(value),
        }
    }
}

/// Failures raised while executing a payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionFailure {
    /// The payload raised an error inside the host runtime.
    #[error("{message}")]
    Raised {
        /// Error text reported by the runtime.
        message: String,
        /// Output captured before the error.
        output: String,
    },
    /// A host accessor is unavailable in the current operating mode.
    #[error("host context restricted: {message}")]
    HostContextRestricted {
        /// Description of the unavailable accessor.
        message: String,
    },
    /// The executor panicked; the panic was contained at the call boundary.
    #[error("executor panicked: {message}")]
    Panicked {
        /// Panic payload rendered as text.
        message: String,
    },
}

impl ExecutionFailure {
    /// Creates a failure raised by the payload.
    pub fn raised(message: impl Into<String>) -> Self {
        Self::Raised {
            message: message.into(),
            output: String::new(),
        }
    }

    /// Creates a failure for an accessor unavailable in this mode.
    pub fn restricted(message: impl Into<String>) -> Self {
        Self::HostContextRestricted {
            message: message.into(),
        }
    }

    /// Attaches output captured before a raised failure.
    #[must_use]
    pub fn with_output(self, captured: impl Into<String>) -> Self {
        match self {
            Self::Raised { message, .. } => Self::Raised {
                message,
                output: captured.into(),
            },
            other => other,
        }
    }

    /// Output captured before the failure, if any.
    #[must_use]
    pub fn output(&self) -> &str {
        match self {
            Self::Raised { output, .. } => output,
            Self::HostContextRestricted { .. } | Self::Panicked { .. } => "",
        }
    }
}

/// Runs `payload`, converting a panic inside the executor into a failure.
pub(crate) fn execute_contained(
    executor: &mut dyn Executor,
    payload: &str,
) -> Result<CapturedOutput, ExecutionFailure> {
    match panic::catch_unwind(AssertUnwindSafe(|| executor.execute(payload))) {
        Ok(result) => result,
        Err(panic_payload) => Err(ExecutionFailure::Panicked {
            message: panic_message(panic_payload.as_ref()),
        }),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_owned()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        String::from("non-textual panic payload")
    }
}
