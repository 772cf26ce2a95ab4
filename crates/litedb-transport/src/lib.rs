//! LiteDB Transport Layer
//!
//! Provides the TCP transport for the command router.
//! The transport layer handles:
//! - Connection lifecycle (accept, read loop, close)
//! - Length-prefixed message framing
//! - Liveness detection and disconnect cleanup
//! - Serialized response writes per connection
//!
//! The transport is decoupled from dispatch via the `MessageHandler` trait.

pub mod client;
pub mod connector;
pub mod error;
pub mod registry;
pub mod server;

pub use client::{ClientConnection, peer_is_open};
pub use connector::Connector;
pub use error::TransportError;
pub use registry::ConnectionRegistry;
pub use server::{MessageHandler, TransportConfig, TransportServer};
