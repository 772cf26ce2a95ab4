//! Message framing.
//!
//! Each message is a 4-byte big-endian length followed by exactly that many
//! bytes, so envelopes survive being split or coalesced by the byte stream.

use tokio_util::codec::LengthDelimitedCodec;

/// Largest frame accepted by default (8 MiB).
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 8 * 1024 * 1024;

/// Length-prefixed codec shared by the server and clients.
pub fn frame_codec(max_frame_length: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .big_endian()
        .max_frame_length(max_frame_length)
        .new_codec()
}
