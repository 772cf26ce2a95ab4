//! Accepted client connection state.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use bytes::Bytes;
use futures_util::{FutureExt, SinkExt};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;
use tokio_util::codec::{FramedWrite, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::TransportError;

/// One accepted socket.
///
/// The read half lives in the connection's read loop; this struct owns the
/// write half behind a mutex so concurrent responses queue instead of
/// interleaving on the wire.
#[derive(Debug)]
pub struct ClientConnection {
    id: String,
    remote_addr: SocketAddr,
    connected_at: Instant,
    open: AtomicBool,
    writer: Mutex<FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>>,
    closed: CancellationToken,
}

impl ClientConnection {
    pub fn new(
        id: String,
        remote_addr: SocketAddr,
        writer: FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>,
    ) -> Self {
        Self {
            id,
            remote_addr,
            connected_at: Instant::now(),
            open: AtomicBool::new(true),
            writer: Mutex::new(writer),
            closed: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Whether `close` has not been called yet.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Full liveness check: still open locally and the peer has not closed
    /// its side of `stream` (the read half of this same socket).
    pub fn is_connected(&self, stream: &TcpStream) -> bool {
        self.is_open() && peer_is_open(stream)
    }

    /// Resolves once the connection has been closed.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    /// Write one frame, aborting if the connection closes first.
    pub async fn send(&self, frame: Bytes) -> Result<(), TransportError> {
        self.send_until(frame, &self.closed).await
    }

    /// Write one frame, aborting if `cancel` fires or the connection closes.
    ///
    /// The write lock is held only inside the write future, so it is released
    /// on success, error, and cancellation alike.
    pub async fn send_until(
        &self,
        frame: Bytes,
        cancel: &CancellationToken,
    ) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::ConnectionClosed(self.id.clone()));
        }

        let write = async {
            let mut writer = self.writer.lock().await;
            writer.send(frame).await
        };

        tokio::select! {
            _ = self.closed.cancelled() => Err(TransportError::ConnectionClosed(self.id.clone())),
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            result = write => result.map_err(TransportError::Io),
        }
    }

    /// Close the connection. Safe to call more than once.
    pub async fn close(&self) {
        if !self.open.swap(false, Ordering::AcqRel) {
            return;
        }
        self.closed.cancel();

        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.get_mut().shutdown().await {
            debug!("Shutdown of {} failed: {e}", self.id);
        }
    }
}

/// Non-blocking one-byte peek. A peek that returns zero bytes means the peer
/// performed an orderly close; a peek that would block means the socket is
/// idle but alive.
pub fn peer_is_open(stream: &TcpStream) -> bool {
    let mut probe = [0u8; 1];
    match stream.peek(&mut probe).now_or_never() {
        None => true,
        Some(Ok(0)) => false,
        Some(Ok(_)) => true,
        Some(Err(e)) => e.kind() == std::io::ErrorKind::WouldBlock,
    }
}
