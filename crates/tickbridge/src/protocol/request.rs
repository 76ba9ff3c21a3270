//! Request decoding for the command protocol.
//!
//! A request is a JSON object carrying the code to execute and an optional
//! human-readable label:
//!
//! ```json
//! {"message":"add numbers","code":"1+1"}
//! ```

use serde::Deserialize;
use serde_json::Value;

use crate::transport::ConnectionId;

use super::errors::ProtocolError;

/// Wire shape of a request.
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    /// Free-text description; logged, never executed.
    #[serde(default)]
    pub message: Option<String>,
    /// Payload handed to the executor.
    pub code: String,
}

impl CommandRequest {
    /// Decodes a request from a complete JSON value.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::InvalidRequest` when the value is not an object
    /// or lacks a string `code` field.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        if !value.is_object() {
            return Err(ProtocolError::invalid_request(format!(
                "expected a JSON object, found {}",
                json_kind(&value)
            )));
        }
        serde_json::from_value(value)
            .map_err(|error| ProtocolError::invalid_request(error.to_string()))
    }

    /// Binds the request to the connection it arrived on.
    pub(crate) fn into_command(self, connection: ConnectionId) -> Command {
        Command {
            label: self.message,
            payload: self.code,
            connection,
        }
    }
}

/// A request accepted for execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Human-readable label supplied by the client.
    pub label: Option<String>,
    /// Code handed to the executor.
    pub payload: String,
    /// Connection the command arrived on.
    pub connection: ConnectionId,
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
