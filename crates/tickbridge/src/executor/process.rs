//! Executor that evaluates payloads with an external interpreter.

use std::process::{Command, Stdio};

use thiserror::Error;
use tickbridge_config::Config;

use super::{CapturedOutput, ExecutionFailure, Executor};

/// Runs each payload as the final argument of an interpreter command such as
/// `python3 -c`, capturing its standard output.
///
/// A non-zero exit status becomes [`ExecutionFailure::Raised`] carrying the
/// interpreter's standard error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExecutor {
    program: String,
    arguments: Vec<String>,
}

/// Errors raised while parsing the interpreter command.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InterpreterError {
    /// The configured command contained no program name.
    #[error("interpreter command is empty")]
    Empty,
}

impl ProcessExecutor {
    /// Parses a whitespace-separated interpreter command line.
    ///
    /// # Errors
    ///
    /// Returns [`InterpreterError::Empty`] when `command` has no program.
    pub fn from_command_line(command: &str) -> Result<Self, InterpreterError> {
        let mut parts = command.split_whitespace().map(str::to_owned);
        let program = parts.next().ok_or(InterpreterError::Empty)?;
        Ok(Self {
            program,
            arguments: parts.collect(),
        })
    }

    /// Builds an executor from the configured interpreter.
    ///
    /// # Errors
    ///
    /// Returns [`InterpreterError::Empty`] when the interpreter is blank.
    pub fn from_config(config: &Config) -> Result<Self, InterpreterError> {
        Self::from_command_line(&config.interpreter)
    }

    /// Program launched for each payload.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Executor for ProcessExecutor {
    fn execute(&mut self, payload: &str) -> Result<CapturedOutput, ExecutionFailure> {
        let output = Command::new(&self.program)
            .args(&self.arguments)
            .arg(payload)
            .stdin(Stdio::null())
            .output()
            .map_err(|error| {
                ExecutionFailure::raised(format!(
                    "failed to launch interpreter '{}': {error}",
                    self.program
                ))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            return Ok(CapturedOutput::text(stdout));
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
        let message = if stderr.is_empty() {
            format!("interpreter exited with {}", output.status)
        } else {
            stderr
        };
        Err(ExecutionFailure::raised(message).with_output(stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_program_and_arguments() {
        let executor = ProcessExecutor::from_command_line("python3  -c").expect("parse command");
        assert_eq!(executor.program(), "python3");
        assert_eq!(executor.arguments, vec!["-c".to_owned()]);
    }

    #[test]
    fn rejects_blank_command() {
        assert_eq!(
            ProcessExecutor::from_command_line("   "),
            Err(InterpreterError::Empty)
        );
    }

    #[test]
    fn reads_interpreter_from_config() {
        let config = Config {
            interpreter: "sh -c".to_owned(),
            ..Config::default()
        };
        let executor = ProcessExecutor::from_config(&config).expect("parse command");
        assert_eq!(executor.program(), "sh");
    }

    #[cfg(unix)]
    #[test]
    fn captures_standard_output() {
        let mut executor = ProcessExecutor::from_command_line("sh -c").expect("parse command");
        let output = executor.execute("echo hello").expect("command succeeds");
        assert_eq!(output.stdout, "hello\n");
    }

    #[cfg(unix)]
    #[test]
    fn reports_standard_error_on_failure() {
        let mut executor = ProcessExecutor::from_command_line("sh -c").expect("parse command");
        let failure = executor
            .execute("echo partial; echo broken >&2; exit 3")
            .expect_err("command fails");
        assert_eq!(failure.to_string(), "broken");
        assert_eq!(failure.output(), "partial\n");
    }

    #[cfg(unix)]
    #[test]
    fn describes_silent_failures_by_status() {
        let mut executor = ProcessExecutor::from_command_line("sh -c").expect("parse command");
        let failure = executor.execute("exit 4").expect_err("command fails");
        assert!(failure.to_string().contains("exited"), "{failure}");
    }

    #[test]
    fn reports_missing_interpreter() {
        let mut executor = ProcessExecutor::from_command_line("tickbridge-no-such-interpreter -c")
            .expect("parse command");
        let failure = executor.execute("1+1").expect_err("launch fails");
        assert!(failure.to_string().contains("failed to launch interpreter"));
    }
}
