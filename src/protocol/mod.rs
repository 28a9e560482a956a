//! Protocol module - chunk types, wire format, and framing.
//!
//! The unit of the Nailgun wire protocol is the chunk:
//! a 4-byte big-endian payload length, a one-byte type tag, then the payload.

mod chunk;
mod chunk_buffer;

pub use chunk::{
    build_chunk, Chunk, ChunkHeader, ChunkType, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE,
    STDIN_BUFFER_SIZE,
};
pub use chunk_buffer::ChunkBuffer;
