use std::io;

use litedb_protocol::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid listen address {0}")]
    InvalidAddress(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    #[error("send cancelled")]
    Cancelled,

    #[error("peer closed the connection")]
    Disconnected,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
