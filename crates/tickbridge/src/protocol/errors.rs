//! Error types for request framing and decoding failures.
//!
//! Every variant is reported back to the client as an `ERROR` response on the
//! connection that produced it; none of them close the connection.

use thiserror::Error;

/// Errors surfaced while extracting or decoding a request.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Bytes on the wire can never form a valid JSON value.
    #[error("malformed JSON: {source}")]
    MalformedJson {
        #[source]
        source: serde_json::Error,
    },

    /// A JSON value started but the rest never arrived.
    #[error("incomplete JSON message: {pending} bytes received without a closing boundary")]
    Truncated { pending: usize },

    /// Buffered bytes exceeded the configured limit before a value completed.
    #[error("request too large: {size} bytes exceeds {max_size} byte limit")]
    FrameTooLarge { size: usize, max_size: usize },

    /// A complete JSON value did not match the request schema.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },
}

impl ProtocolError {
    /// Creates a malformed JSON error from a serde error.
    pub fn from_json_error(source: serde_json::Error) -> Self {
        Self::MalformedJson { source }
    }

    /// Creates a truncated frame error.
    pub fn truncated(pending: usize) -> Self {
        Self::Truncated { pending }
    }

    /// Creates a frame too large error.
    pub fn frame_too_large(size: usize, max_size: usize) -> Self {
        Self::FrameTooLarge { size, max_size }
    }

    /// Creates an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }
}
