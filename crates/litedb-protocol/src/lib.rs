//! LiteDB Command Protocol - Protocol Types
//!
//! Wire envelopes exchanged between clients and the command router.
//! This crate is the single source of truth for operation names,
//! error codes, payload packing and message framing.

pub mod codec;
pub mod envelope;
pub mod error;
pub mod operation;
pub mod payload;

pub use codec::{DEFAULT_MAX_FRAME_LENGTH, frame_codec};
pub use envelope::{
    Command, CommandResult, decode_command, decode_result, encode_command, encode_result,
};
pub use error::{ErrorCode, ProtocolError};
pub use operation::{Operation, UnknownOperation};
pub use payload::{Payload, PayloadError, TypedPayload};
