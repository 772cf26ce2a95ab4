//! Client side of the transport: connect, send commands, read results.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use litedb_protocol::{
    Command, CommandResult, DEFAULT_MAX_FRAME_LENGTH, decode_result, encode_command, frame_codec,
};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::error::TransportError;

/// A framed connection to a LiteDB server.
pub struct Connector {
    framed: Framed<TcpStream, LengthDelimitedCodec>,
}

impl Connector {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self {
            framed: Framed::new(stream, frame_codec(DEFAULT_MAX_FRAME_LENGTH)),
        })
    }

    pub async fn send(&mut self, command: &Command) -> Result<(), TransportError> {
        let bytes = encode_command(command)?;
        self.send_raw(Bytes::from(bytes)).await
    }

    /// Send an arbitrary frame body, bypassing envelope encoding.
    pub async fn send_raw(&mut self, frame: Bytes) -> Result<(), TransportError> {
        self.framed.send(frame).await?;
        Ok(())
    }

    /// Wait for the next result frame.
    pub async fn receive(&mut self) -> Result<CommandResult, TransportError> {
        match self.framed.next().await {
            Some(Ok(frame)) => Ok(decode_result(&frame)?),
            Some(Err(e)) => Err(TransportError::Io(e)),
            None => Err(TransportError::Disconnected),
        }
    }

    /// Send a command and wait for the next result.
    ///
    /// Only meaningful with one command in flight; with several, match
    /// results to commands by `id`.
    pub async fn request(&mut self, command: &Command) -> Result<CommandResult, TransportError> {
        self.send(command).await?;
        self.receive().await
    }

    pub fn into_inner(self) -> TcpStream {
        self.framed.into_inner()
    }
}
