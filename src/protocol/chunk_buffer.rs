//! Chunk buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management and a small state
//! machine for handling fragmented chunks:
//! - `WaitingForHeader`: need at least 5 bytes
//! - `WaitingForPayload`: header parsed, need N more payload bytes
//!
//! Only complete chunks are ever emitted — a payload is consumed in full
//! before the next header is parsed, so callers never observe partial-chunk
//! state.

use bytes::BytesMut;

use super::chunk::{Chunk, ChunkHeader, ChunkType, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};
use crate::error::Result;

/// State machine for chunk parsing.
#[derive(Debug, Clone)]
enum State {
    /// Waiting for a complete header (need 5 bytes).
    WaitingForHeader,
    /// Header parsed, waiting for payload bytes.
    WaitingForPayload { header: ChunkHeader },
}

/// Buffer for accumulating incoming bytes and extracting complete chunks.
pub struct ChunkBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum allowed payload size.
    max_payload_size: u32,
}

impl ChunkBuffer {
    /// Create a new chunk buffer with default settings.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create a new chunk buffer with a custom max payload size.
    pub fn with_max_payload(max_payload_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8 * 1024),
            state: State::WaitingForHeader,
            max_payload_size,
        }
    }

    /// Push data into the buffer and extract all complete chunks.
    ///
    /// Returns the chunks completed by this push (possibly none); fragmented
    /// data is buffered internally for the next push.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if a declared payload length exceeds the
    /// maximum or a chunk carries an unknown type tag. Framing errors are
    /// fatal; the buffer must not be reused afterwards.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Chunk>> {
        self.buffer.extend_from_slice(data);

        let mut chunks = Vec::new();
        while let Some(chunk) = self.try_extract_one()? {
            chunks.push(chunk);
        }

        Ok(chunks)
    }

    /// Try to extract a single chunk from the buffer.
    fn try_extract_one(&mut self) -> Result<Option<Chunk>> {
        loop {
            match &self.state {
                State::WaitingForHeader => {
                    if self.buffer.len() < HEADER_SIZE {
                        return Ok(None);
                    }

                    let header = ChunkHeader::decode(&self.buffer[..HEADER_SIZE])
                        .expect("buffer has enough bytes");
                    header.validate(self.max_payload_size)?;

                    let _ = self.buffer.split_to(HEADER_SIZE);
                    self.state = State::WaitingForPayload { header };
                }

                State::WaitingForPayload { header } => {
                    let needed = header.len as usize;
                    if self.buffer.len() < needed {
                        return Ok(None);
                    }

                    let chunk_type = ChunkType::from_u8(header.chunk_type)?;
                    let payload = self.buffer.split_to(needed).freeze();
                    self.state = State::WaitingForHeader;

                    return Ok(Some(Chunk::new(chunk_type, payload)));
                }
            }
        }
    }

    /// Get the number of buffered (not yet consumed) bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// True if a parsed header is still waiting for its payload.
    ///
    /// Used to distinguish a clean EOF at a chunk boundary from a stream
    /// truncated mid-chunk.
    pub fn mid_chunk(&self) -> bool {
        !self.buffer.is_empty() || matches!(self.state, State::WaitingForPayload { .. })
    }
}

impl Default for ChunkBuffer {
    fn default() -> Self {
        Self::new()
    }
}
