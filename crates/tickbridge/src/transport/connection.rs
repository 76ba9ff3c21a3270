//! Per-connection read, submit and reply loop.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::dispatch::Dispatcher;
use crate::protocol::{CommandRequest, FrameDecoder, FrameEvent, Response};

use super::{ConnectionFault, ConnectionId, ConnectionSettings, TRANSPORT_TARGET};

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// One accepted socket with its framing state.
///
/// Requests on a connection are handled strictly one after another, so
/// responses leave in the order their requests arrived.
#[derive(Debug)]
pub(crate) struct FramedConnection {
    stream: TcpStream,
    id: ConnectionId,
    decoder: FrameDecoder,
    partial_frame_timeout: Duration,
}

enum ReadOutcome {
    Bytes(usize),
    Closed,
    PartialExpired,
}

impl FramedConnection {
    pub(crate) fn new(stream: TcpStream, id: ConnectionId, settings: ConnectionSettings) -> Self {
        Self {
            stream,
            id,
            decoder: FrameDecoder::new(settings.max_frame_bytes),
            partial_frame_timeout: settings.partial_frame_timeout,
        }
    }

    /// Serves requests until the peer disconnects or the socket fails.
    pub(crate) async fn serve(mut self, dispatcher: &Dispatcher) {
        match self.run(dispatcher).await {
            Ok(()) => debug!(
                target: TRANSPORT_TARGET,
                connection = %self.id,
                "peer disconnected"
            ),
            Err(fault) => warn!(
                target: TRANSPORT_TARGET,
                connection = %self.id,
                error = %fault,
                "connection fault"
            ),
        }
    }

    async fn run(&mut self, dispatcher: &Dispatcher) -> Result<(), ConnectionFault> {
        let mut chunk = vec![0_u8; READ_CHUNK_BYTES];
        loop {
            let events = match self.read_chunk(&mut chunk).await? {
                ReadOutcome::Closed => return Ok(()),
                ReadOutcome::Bytes(count) => self.decoder.push(&chunk[..count]),
                ReadOutcome::PartialExpired => self.decoder.expire_partial().into_iter().collect(),
            };
            for event in events {
                let response = self.handle_event(event, dispatcher).await;
                self.send_response(&response, dispatcher.source()).await?;
            }
        }
    }

    async fn read_chunk(&mut self, chunk: &mut [u8]) -> Result<ReadOutcome, ConnectionFault> {
        let read = if self.decoder.has_partial() {
            match tokio::time::timeout(self.partial_frame_timeout, self.stream.read(chunk)).await {
                Ok(read) => read,
                Err(_elapsed) => return Ok(ReadOutcome::PartialExpired),
            }
        } else {
            self.stream.read(chunk).await
        };
        match read {
            Ok(0) => Ok(ReadOutcome::Closed),
            Ok(count) => Ok(ReadOutcome::Bytes(count)),
            Err(source) => Err(ConnectionFault::Read { source }),
        }
    }

    async fn handle_event(&self, event: FrameEvent, dispatcher: &Dispatcher) -> Response {
        let value = match event {
            FrameEvent::Value(value) => value,
            FrameEvent::Rejected(error) => {
                debug!(
                    target: TRANSPORT_TARGET,
                    connection = %self.id,
                    error = %error,
                    "rejected frame"
                );
                return Response::error(dispatcher.source(), error.to_string());
            }
        };
        match CommandRequest::from_value(value) {
            Ok(request) => {
                if let Some(label) = request.message.as_deref() {
                    debug!(
                        target: TRANSPORT_TARGET,
                        connection = %self.id,
                        label,
                        "request received"
                    );
                }
                dispatcher.submit(request.into_command(self.id)).await
            }
            Err(error) => Response::error(dispatcher.source(), error.to_string()),
        }
    }

    /// Writes one response as a single newline-terminated value.
    async fn send_response(
        &mut self,
        response: &Response,
        source: &str,
    ) -> Result<(), ConnectionFault> {
        let frame = match response.to_frame() {
            Ok(frame) => frame,
            Err(error) => Response::error(source, format!("failed to encode result: {error}"))
                .to_frame()
                .map_err(|source| ConnectionFault::Encode { source })?,
        };
        self.stream
            .write_all(&frame)
            .await
            .map_err(|source| ConnectionFault::Write { source })?;
        self.stream
            .flush()
            .await
            .map_err(|source| ConnectionFault::Write { source })
    }
}
