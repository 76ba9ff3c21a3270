//! Response serialization for the command protocol.
//!
//! Every response carries `response`, `message` and `source`. Captured output
//! and a serialized return value are appended when the executor produced them:
//!
//! ```json
//! {"response":"OK","message":"command executed","source":"tcp://127.0.0.1:6688","result":2}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome indicator carried in the `response` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseStatus {
    /// The command ran to completion.
    #[serde(rename = "OK")]
    Ok,
    /// The request was rejected or the command failed.
    #[serde(rename = "ERROR")]
    Error,
}

/// A single reply written back to the originating connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Success or error indicator.
    pub response: ResponseStatus,
    /// Status text, or the error description on failure.
    pub message: String,
    /// Listener that produced the response, as `tcp://host:port`.
    pub source: String,
    /// Standard output captured while the command ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Serialized return value of the command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl Response {
    /// Creates a success response.
    pub fn ok(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ResponseStatus::Ok, source, message)
    }

    /// Creates an error response.
    pub fn error(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ResponseStatus::Error, source, message)
    }

    fn new(
        response: ResponseStatus,
        source: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            response,
            message: message.into(),
            source: source.into(),
            output: None,
            result: None,
        }
    }

    /// Attaches captured output; empty output is omitted.
    #[must_use]
    pub fn with_output(mut self, output: String) -> Self {
        self.output = (!output.is_empty()).then_some(output);
        self
    }

    /// Attaches a serialized return value.
    #[must_use]
    pub fn with_result(mut self, result: Option<Value>) -> Self {
        self.result = result;
        self
    }

    /// Returns true for `OK` responses.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.response == ResponseStatus::Ok
    }

    /// Serializes the response as one newline-terminated JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if a captured value cannot be serialized.
    pub fn to_frame(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut bytes = serde_json::to_vec(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const SOURCE: &str = "tcp://127.0.0.1:6688";

    #[test]
    fn ok_response_uses_wire_names() {
        let frame = Response::ok(SOURCE, "command executed")
            .to_frame()
            .expect("serialize");
        let text = String::from_utf8(frame).expect("utf8");
        assert!(text.contains(r#""response":"OK""#));
        assert!(text.contains(r#""source":"tcp://127.0.0.1:6688""#));
        assert!(text.ends_with('\n'));
        assert_eq!(text.matches('\n').count(), 1);
    }

    #[test]
    fn optional_fields_are_omitted_when_absent() {
        let value = serde_json::to_value(Response::error(SOURCE, "boom")).expect("serialize");
        assert_eq!(
            value,
            json!({"response":"ERROR","message":"boom","source":SOURCE})
        );
    }

    #[test]
    fn empty_output_is_dropped() {
        let response = Response::ok(SOURCE, "done").with_output(String::new());
        assert!(response.output.is_none());
    }

    #[test]
    fn captured_output_and_result_are_serialized() {
        let response = Response::ok(SOURCE, "done")
            .with_output("hello\n".to_owned())
            .with_result(Some(json!(2)));
        let value = serde_json::to_value(&response).expect("serialize");
        assert_eq!(value["output"], json!("hello\n"));
        assert_eq!(value["result"], json!(2));
    }
}
