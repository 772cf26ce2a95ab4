//! TCP transport server.
//!
//! Accepts connections, runs one read loop per connection, hands every
//! inbound frame to the [`MessageHandler`] on its own task and writes the
//! handler's response back to the originating connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use litedb_protocol::{DEFAULT_MAX_FRAME_LENGTH, frame_codec};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::client::ClientConnection;
use crate::error::TransportError;
use crate::registry::ConnectionRegistry;

/// Implemented by the dispatcher to process inbound frames.
/// The transport calls this once per received frame, on a dedicated task.
pub trait MessageHandler: Send + Sync + 'static {
    /// Handle one frame from `client_id` and return the response frame, if any.
    ///
    /// `cancel` fires when the server gives up waiting for in-flight work
    /// during shutdown.
    fn handle_message(
        &self,
        client_id: &str,
        frame: Bytes,
        cancel: CancellationToken,
    ) -> impl std::future::Future<Output = Option<Bytes>> + Send;
}

/// Transport server configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Hostname to bind to
    pub hostname: String,
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Maximum concurrent connections
    pub max_connections: Option<usize>,
    /// Largest accepted frame, in bytes
    pub max_frame_length: usize,
    /// How long `stop` waits for in-flight dispatches before cancelling them
    pub shutdown_grace: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            hostname: "127.0.0.1".into(),
            port: 9999,
            max_connections: None,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// State shared by the accept loop, read loops and dispatch tasks.
struct TransportCore {
    config: TransportConfig,
    registry: ConnectionRegistry,
    /// Stops the accept loop and every read loop.
    accept_cancel: CancellationToken,
    /// Cancels in-flight dispatches once the shutdown grace period runs out.
    dispatch_cancel: CancellationToken,
    connections: TaskTracker,
    dispatches: TaskTracker,
}

impl TransportCore {
    async fn send(&self, client_id: &str, frame: Bytes) -> Result<(), TransportError> {
        let connection = self
            .registry
            .get(client_id)
            .ok_or_else(|| TransportError::ConnectionNotFound(client_id.to_string()))?;
        connection.send(frame).await
    }
}

/// Accepts TCP connections and routes their frames to a handler.
pub struct TransportServer {
    core: Arc<TransportCore>,
    accept_handle: Mutex<Option<JoinHandle<()>>>,
    local_addr: SocketAddr,
    running: AtomicBool,
}

impl TransportServer {
    /// Bind the listener and start accepting connections.
    pub async fn start<H: MessageHandler>(
        config: TransportConfig,
        handler: H,
    ) -> Result<Self, TransportError> {
        Self::start_shared(config, Arc::new(handler)).await
    }

    /// Start with a handler that is shared with other owners.
    pub async fn start_shared<H: MessageHandler>(
        config: TransportConfig,
        handler: Arc<H>,
    ) -> Result<Self, TransportError> {
        let bind_addr = format!("{}:{}", config.hostname, config.port);
        let addr: SocketAddr = bind_addr
            .parse()
            .map_err(|_| TransportError::InvalidAddress(bind_addr.clone()))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: bind_addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        info!("LiteDB transport listening on {local_addr}");

        let core = Arc::new(TransportCore {
            config,
            registry: ConnectionRegistry::new(),
            accept_cancel: CancellationToken::new(),
            dispatch_cancel: CancellationToken::new(),
            connections: TaskTracker::new(),
            dispatches: TaskTracker::new(),
        });

        let handle = tokio::spawn(accept_loop(listener, core.clone(), handler));

        Ok(Self {
            core,
            accept_handle: Mutex::new(Some(handle)),
            local_addr,
            running: AtomicBool::new(true),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get the actual bound port.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn client(&self, client_id: &str) -> Option<Arc<ClientConnection>> {
        self.core.registry.get(client_id)
    }

    pub fn client_ids(&self) -> Vec<String> {
        self.core.registry.ids()
    }

    pub fn client_count(&self) -> usize {
        self.core.registry.len()
    }

    /// Send one frame to a connected client.
    pub async fn send(&self, client_id: &str, frame: Bytes) -> Result<(), TransportError> {
        self.core.send(client_id, frame).await
    }

    /// Gracefully stop the server. A second call is a no-op.
    ///
    /// Order: stop accepting, wait for every read loop to exit, let in-flight
    /// dispatches finish (cancelling them after the grace period), close
    /// every connection, clear the registry. No dispatch can be spawned once
    /// the read loops are gone.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        info!("Stopping LiteDB transport...");

        self.core.accept_cancel.cancel();
        if let Some(handle) = self.accept_handle.lock().await.take() {
            if let Err(e) = handle.await {
                error!("Accept loop panicked: {e:?}");
            }
        }

        self.core.connections.close();
        self.core.connections.wait().await;

        self.core.dispatches.close();
        let grace = self.core.config.shutdown_grace;
        if tokio::time::timeout(grace, self.core.dispatches.wait()).await.is_err() {
            warn!("In-flight commands still running after {grace:?}, cancelling");
            self.core.dispatch_cancel.cancel();
            self.core.dispatches.wait().await;
        }

        for connection in self.core.registry.snapshot() {
            connection.close().await;
        }
        self.core.registry.clear();
        info!("LiteDB transport stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Accept loop
// ─────────────────────────────────────────────────────────────────────────────

async fn accept_loop<H: MessageHandler>(
    listener: TcpListener,
    core: Arc<TransportCore>,
    handler: Arc<H>,
) {
    loop {
        tokio::select! {
            _ = core.accept_cancel.cancelled() => {
                debug!("Accept loop received shutdown signal");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, addr)) => register_connection(&core, &handler, socket, addr),
                    Err(e) => error!("Failed to accept connection: {e}"),
                }
            }
        }
    }
}

fn register_connection<H: MessageHandler>(
    core: &Arc<TransportCore>,
    handler: &Arc<H>,
    socket: TcpStream,
    addr: SocketAddr,
) {
    if let Some(max) = core.config.max_connections {
        if core.registry.len() >= max {
            warn!("Connection from {addr} rejected: max connections reached ({max})");
            return;
        }
    }

    if let Err(e) = socket.set_nodelay(true) {
        debug!("Could not set TCP_NODELAY for {addr}: {e}");
    }

    let (read_half, write_half) = socket.into_split();
    let max_frame = core.config.max_frame_length;
    let reader = FramedRead::new(read_half, frame_codec(max_frame));
    let writer = FramedWrite::new(write_half, frame_codec(max_frame));

    let client_id = uuid::Uuid::new_v4().to_string();
    let connection = Arc::new(ClientConnection::new(client_id.clone(), addr, writer));
    if !core.registry.insert(connection.clone()) {
        warn!("Duplicate connection id {client_id}, dropping connection from {addr}");
        return;
    }

    info!("Client {addr} connected. Id [{client_id}] (total: {})", core.registry.len());
    core.connections
        .spawn(read_loop(core.clone(), handler.clone(), connection, reader));
}

// ─────────────────────────────────────────────────────────────────────────────
// Per-connection read loop
// ─────────────────────────────────────────────────────────────────────────────

enum LoopExit {
    Shutdown,
    Disconnected,
}

async fn read_loop<H: MessageHandler>(
    core: Arc<TransportCore>,
    handler: Arc<H>,
    connection: Arc<ClientConnection>,
    mut reader: FramedRead<OwnedReadHalf, LengthDelimitedCodec>,
) {
    let client_id = connection.id().to_string();

    let exit = loop {
        // Bytes already buffered still have to be decoded even if the peer
        // has since closed its side.
        let stream: &TcpStream = reader.get_ref().as_ref();
        if reader.read_buffer().is_empty() && !connection.is_connected(stream) {
            debug!("Liveness check failed for {client_id}");
            break LoopExit::Disconnected;
        }

        let next = tokio::select! {
            biased;
            _ = core.accept_cancel.cancelled() => break LoopExit::Shutdown,
            _ = connection.closed() => break LoopExit::Disconnected,
            next = reader.next() => next,
        };

        match next {
            Some(Ok(frame)) => {
                debug!("Received {} byte message from {client_id}", frame.len());
                spawn_dispatch(&core, &handler, &client_id, frame.freeze());
            }
            Some(Err(e)) => {
                warn!("Read error for {client_id}: {e}");
                break LoopExit::Disconnected;
            }
            None => {
                debug!("Client {client_id} closed the connection");
                break LoopExit::Disconnected;
            }
        }
    };

    // On shutdown the socket stays open: `stop` closes it after in-flight
    // responses are sent.
    if let LoopExit::Disconnected = exit {
        core.registry.remove(&client_id);
        connection.close().await;
        info!(
            "Client {} disconnected. Id [{client_id}] (total: {})",
            connection.remote_addr(),
            core.registry.len()
        );
    }
}

fn spawn_dispatch<H: MessageHandler>(
    core: &Arc<TransportCore>,
    handler: &Arc<H>,
    client_id: &str,
    frame: Bytes,
) {
    let core = core.clone();
    let handler = handler.clone();
    let client_id = client_id.to_string();

    core.dispatches.clone().spawn(async move {
        let cancel = core.dispatch_cancel.clone();
        let Some(response) = handler.handle_message(&client_id, frame, cancel).await else {
            return;
        };
        if let Err(e) = core.send(&client_id, response).await {
            warn!("Failed to send response to {client_id}: {e}");
        }
    });
}
