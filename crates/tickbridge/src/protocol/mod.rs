//! Wire protocol: framing, request decoding and response encoding.
//!
//! Clients send JSON objects over a persistent TCP connection. Values are
//! delimited by JSON structure, so newlines are optional and a request may be
//! split across any number of packets. Each request receives exactly one
//! response, written as a single newline-terminated JSON value.

mod errors;
mod frame;
mod request;
mod response;

pub use self::errors::ProtocolError;
pub(crate) use self::frame::{FrameDecoder, FrameEvent};
pub use self::request::{Command, CommandRequest};
pub use self::response::{Response, ResponseStatus};
