//! Server facade — builds the registry and runs it on a transport.

use std::net::SocketAddr;
use std::sync::Arc;

use litedb_transport::{TransportConfig, TransportError, TransportServer};
use thiserror::Error;
use tracing::info;

use crate::dispatcher::Dispatcher;
use crate::registry::{HandlerRegistry, RouteTable};
use crate::route::RouteError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// A configured server that has not started listening yet.
pub struct Server {
    config: TransportConfig,
    registry: Arc<HandlerRegistry>,
}

impl Server {
    /// Compile `routes`. Invalid templates are rejected here, before any
    /// socket is bound.
    pub fn new(config: TransportConfig, routes: RouteTable) -> Result<Self, ServerError> {
        let registry = HandlerRegistry::from_table(routes)?;
        Ok(Self {
            config,
            registry: Arc::new(registry),
        })
    }

    /// Bind the listener and start serving.
    pub async fn run(self) -> Result<RunningServer, ServerError> {
        let routes = self.registry.len();
        let dispatcher = Dispatcher::new(self.registry);
        let transport = TransportServer::start(self.config, dispatcher).await?;
        info!("LiteDB server running on {} ({routes} routes)", transport.local_addr());
        Ok(RunningServer { transport })
    }
}

/// Handle to a listening server.
pub struct RunningServer {
    transport: TransportServer,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn port(&self) -> u16 {
        self.transport.port()
    }

    pub fn client_count(&self) -> usize {
        self.transport.client_count()
    }

    pub fn is_running(&self) -> bool {
        self.transport.is_running()
    }

    /// Stop accepting, drain in-flight commands and close every connection.
    /// Safe to call more than once.
    pub async fn stop(&self) {
        if !self.transport.is_running() {
            return;
        }
        self.transport.stop().await;
        info!("LiteDB server stopped");
    }
}
