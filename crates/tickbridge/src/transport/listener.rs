//! Listener binding and the accept loop.

use std::io;
use std::net::{SocketAddr, TcpListener as StdTcpListener, ToSocketAddrs};
use std::time::Duration;

use tickbridge_config::Endpoint;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use super::{ConnectionContext, FramedConnection, ListenerError, TRANSPORT_TARGET};

const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// A socket bound to the configured endpoint but not yet accepting.
#[derive(Debug)]
pub(crate) struct BoundListener {
    listener: StdTcpListener,
    local_addr: SocketAddr,
}

impl BoundListener {
    pub(crate) fn bind(endpoint: &Endpoint) -> Result<Self, ListenerError> {
        let listener = bind_tcp(&endpoint.host, endpoint.port)?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ListenerError::LocalAddr { source })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| ListenerError::NonBlocking { source })?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Address actually bound, including the port picked for port `0`.
    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Registers the socket with the current runtime's reactor.
    ///
    /// Must be called with a runtime context entered.
    pub(crate) fn into_async(self) -> Result<TcpListener, ListenerError> {
        TcpListener::from_std(self.listener).map_err(|source| ListenerError::Register { source })
    }
}

fn bind_tcp(host: &str, port: u16) -> Result<StdTcpListener, ListenerError> {
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            host: host.to_owned(),
            port,
            source,
        })?;
    let addr = addrs.next().ok_or_else(|| ListenerError::ResolveEmpty {
        host: host.to_owned(),
        port,
    })?;
    StdTcpListener::bind(addr).map_err(|source| ListenerError::BindTcp { addr, source })
}

/// Accepts connections until the task is aborted, spawning one local task per
/// socket.
pub(crate) async fn accept_loop(listener: TcpListener, context: ConnectionContext) {
    info!(
        target: TRANSPORT_TARGET,
        source = context.dispatcher.source(),
        "command listener active"
    );
    let mut last_error = None::<io::ErrorKind>;
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                last_error = None;
                spawn_connection(stream, peer, &context);
            }
            Err(error) => {
                let kind = error.kind();
                if last_error != Some(kind) {
                    warn!(
                        target: TRANSPORT_TARGET,
                        error = %error,
                        "socket accept error"
                    );
                }
                last_error = Some(kind);
                tokio::time::sleep(ERROR_BACKOFF).await;
            }
        }
    }
}

fn spawn_connection(stream: TcpStream, peer: SocketAddr, context: &ConnectionContext) {
    if let Err(error) = stream.set_nodelay(true) {
        debug!(
            target: TRANSPORT_TARGET,
            peer = %peer,
            error = %error,
            "failed to disable Nagle's algorithm"
        );
    }
    let guard = context.registry.register(peer);
    let id = guard.id();
    let connection = FramedConnection::new(stream, id, context.settings);
    let dispatcher = context.dispatcher.clone();
    let task = tokio::task::spawn_local(async move {
        let _guard = guard;
        connection.serve(&dispatcher).await;
    });
    context.registry.attach_task(id, task.abort_handle());
}
