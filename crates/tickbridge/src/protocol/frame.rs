//! Incremental extraction of JSON values from a TCP byte stream.
//!
//! Requests are delimited by JSON structure rather than by newlines: one chunk
//! may carry several values and one value may span several chunks. Bytes only
//! leave the front of the buffer once a complete value, or a definitively
//! malformed run of bytes, has been identified.

use serde_json::Value;

use super::errors::ProtocolError;

/// Outcome of feeding bytes to a [`FrameDecoder`].
#[derive(Debug)]
pub(crate) enum FrameEvent {
    /// A complete JSON value ready to be decoded as a request.
    Value(Value),
    /// Bytes that cannot form a request; answered with an error response.
    Rejected(ProtocolError),
}

/// Accumulates raw bytes and yields complete JSON values.
///
/// A value that never closes absorbs whatever follows it on the stream. A
/// truncated request followed by a well-formed one therefore parses as a
/// single longer partial value, and the connection answers both sends with
/// one truncation error once the partial timeout expires.
#[derive(Debug)]
pub(crate) struct FrameDecoder {
    buffer: Vec<u8>,
    max_frame_bytes: usize,
}

enum Step {
    Drained,
    Complete { value: Value, consumed: usize },
    Incomplete,
    Invalid {
        error: serde_json::Error,
        consumed: usize,
    },
}

impl FrameDecoder {
    pub(crate) fn new(max_frame_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_frame_bytes,
        }
    }

    /// Appends `chunk` and extracts every value it completes.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<FrameEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        loop {
            match next_step(&self.buffer) {
                Step::Drained => {
                    self.buffer.clear();
                    break;
                }
                Step::Complete { value, consumed } => {
                    self.consume(consumed);
                    events.push(FrameEvent::Value(value));
                }
                Step::Invalid { error, consumed } => {
                    self.consume(consumed);
                    events.push(FrameEvent::Rejected(ProtocolError::from_json_error(error)));
                }
                Step::Incomplete => {
                    if self.buffer.len() > self.max_frame_bytes {
                        let size = self.buffer.len();
                        self.buffer.clear();
                        events.push(FrameEvent::Rejected(ProtocolError::frame_too_large(
                            size,
                            self.max_frame_bytes,
                        )));
                    }
                    break;
                }
            }
        }
        events
    }

    /// Returns true while a value has started but not yet completed.
    pub(crate) fn has_partial(&self) -> bool {
        self.buffer.iter().any(|byte| !byte.is_ascii_whitespace())
    }

    /// Gives up on a pending partial value, clearing the buffer.
    pub(crate) fn expire_partial(&mut self) -> Option<FrameEvent> {
        let pending = self.has_partial().then_some(self.buffer.len());
        self.buffer.clear();
        pending.map(|bytes| FrameEvent::Rejected(ProtocolError::truncated(bytes)))
    }

    fn consume(&mut self, count: usize) {
        let count = count.min(self.buffer.len());
        self.buffer.drain(..count);
    }
}

fn next_step(buffer: &[u8]) -> Step {
    let mut values = serde_json::Deserializer::from_slice(buffer).into_iter::<Value>();
    match values.next() {
        None => Step::Drained,
        Some(Ok(value)) => Step::Complete {
            value,
            consumed: values.byte_offset(),
        },
        Some(Err(error)) if error.is_eof() => Step::Incomplete,
        Some(Err(error)) => {
            let consumed = discard_length(buffer, &error);
            Step::Invalid { error, consumed }
        }
    }
}

/// Number of bytes to drop after a syntax error: everything up to and
/// including the first newline after the error, or the whole buffer.
fn discard_length(buffer: &[u8], error: &serde_json::Error) -> usize {
    let offset = error_offset(buffer, error.line(), error.column());
    buffer
        .iter()
        .skip(offset)
        .position(|byte| *byte == b'\n')
        .map_or(buffer.len(), |position| offset + position + 1)
}

fn error_offset(buffer: &[u8], line: usize, column: usize) -> usize {
    let line_start = if line <= 1 {
        0
    } else {
        buffer
            .iter()
            .enumerate()
            .filter(|(_, byte)| **byte == b'\n')
            .nth(line - 2)
            .map_or(buffer.len(), |(index, _)| index + 1)
    };
    (line_start + column.saturating_sub(1)).min(buffer.len())
}
