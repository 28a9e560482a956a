//! Chunk types and wire format encoding/decoding.
//!
//! Implements the 5-byte chunk header:
//! ```text
//! ┌───────────┬───────┐
//! │ Length    │ Type  │
//! │ 4 bytes   │ 1 byte│
//! │ uint32 BE │       │
//! └───────────┴───────┘
//! ```
//!
//! The length counts payload bytes only; the type is a one-byte tag from a
//! fixed enumeration. The length prefix is authoritative — text payloads
//! (arguments, environment entries, directory, command) carry no delimiter.

use bytes::Bytes;

use crate::error::{NailgunError, Result};

/// Header size in bytes (fixed, exactly 5).
pub const HEADER_SIZE: usize = 5;

/// Maximum accepted payload size (1 MiB).
///
/// Real server chunks are a few KiB at most; a larger declared length means
/// the stream is corrupt and must not be treated as a huge allocation.
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 1_048_576;

/// Number of bytes forwarded per stdin chunk, matching the classic clients.
pub const STDIN_BUFFER_SIZE: usize = 2048;

/// Chunk type tags. Wire values are fixed by the Nailgun protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChunkType {
    /// One command-line argument (client → server).
    Argument = b'A',
    /// One `NAME=VALUE` environment entry (client → server).
    Environment = b'E',
    /// Working directory path (client → server).
    WorkingDirectory = b'D',
    /// Command/entry-point name; terminates the setup phase (client → server).
    Command = b'C',
    /// Stdin data (client → server).
    Stdin = b'0',
    /// Stdin end-of-stream marker, no payload (client → server).
    StdinEof = b'.',
    /// Heartbeat, no payload (client → server).
    Heartbeat = b'H',
    /// Stdout data (server → client).
    Stdout = b'1',
    /// Stderr data (server → client).
    Stderr = b'2',
    /// Server is ready to accept more stdin (server → client).
    SendInput = b'S',
    /// Exit; payload is the exit code as decimal text. Terminal.
    Exit = b'X',
}

impl ChunkType {
    /// Parse a wire tag byte.
    pub fn from_u8(byte: u8) -> Result<Self> {
        Ok(match byte {
            b'A' => Self::Argument,
            b'E' => Self::Environment,
            b'D' => Self::WorkingDirectory,
            b'C' => Self::Command,
            b'0' => Self::Stdin,
            b'.' => Self::StdinEof,
            b'H' => Self::Heartbeat,
            b'1' => Self::Stdout,
            b'2' => Self::Stderr,
            b'S' => Self::SendInput,
            b'X' => Self::Exit,
            other => {
                return Err(NailgunError::Protocol(format!(
                    "unknown chunk type byte 0x{other:02x}"
                )))
            }
        })
    }

    /// Wire tag byte for this chunk type.
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Decoded chunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Payload length in bytes.
    pub len: u32,
    /// Raw type tag byte (validated against [`ChunkType`] when the chunk is
    /// assembled, so a corrupt tag is reported after the length guard).
    pub chunk_type: u8,
}

impl ChunkHeader {
    /// Create a new header.
    pub fn new(len: u32, chunk_type: u8) -> Self {
        Self { len, chunk_type }
    }

    /// Encode header to bytes (length Big Endian, then type tag).
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (5 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0..4].copy_from_slice(&self.len.to_be_bytes());
        buf[4] = self.chunk_type;
    }

    /// Decode header from bytes.
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            len: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            chunk_type: buf[4],
        })
    }

    /// Validate the declared payload length against the configured maximum.
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if self.len > max_payload_size {
            return Err(NailgunError::Protocol(format!(
                "chunk payload size {} exceeds maximum {}",
                self.len, max_payload_size
            )));
        }
        Ok(())
    }
}

/// A complete protocol chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Validated chunk type.
    pub chunk_type: ChunkType,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Chunk {
    /// Create a new chunk from a type and payload.
    pub fn new(chunk_type: ChunkType, payload: Bytes) -> Self {
        Self {
            chunk_type,
            payload,
        }
    }

    /// Create a chunk with no payload (heartbeat, stdin EOF).
    pub fn empty(chunk_type: ChunkType) -> Self {
        Self {
            chunk_type,
            payload: Bytes::new(),
        }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

/// Build a complete chunk as a single byte vector.
///
/// Encodes `length(4 BE) ++ type(1) ++ payload` into a contiguous buffer.
///
/// # Example
///
/// ```
/// use nailgun_client::protocol::{build_chunk, ChunkType, HEADER_SIZE};
///
/// let bytes = build_chunk(ChunkType::Argument, b"--verbose");
/// assert_eq!(bytes.len(), HEADER_SIZE + 9);
/// assert_eq!(bytes[4], b'A');
/// ```
pub fn build_chunk(chunk_type: ChunkType, payload: &[u8]) -> Vec<u8> {
    let header = ChunkHeader::new(payload.len() as u32, chunk_type.as_u8());
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    buf
}
