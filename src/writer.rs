//! Dedicated writer task serializing all outbound chunks.
//!
//! The transport's write path is shared by two producers: the session
//! (setup and stdin chunks) and the heartbeat task. Instead of an
//! `Arc<Mutex<Writer>>`, every producer holds a cloned [`WriterHandle`]
//! feeding one mpsc channel, and a single task owns the write half. Chunks
//! are therefore written whole, one after another — a heartbeat can never
//! land in the middle of a payload frame.
//!
//! # Architecture
//!
//! ```text
//! Session   ─┐
//!            ├─► mpsc::Sender<OutboundChunk> ─► Writer Task ─► Pipe
//! Heartbeat ─┘
//! ```

use std::io::IoSlice;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{NailgunError, Result};
use crate::protocol::{ChunkHeader, ChunkType, HEADER_SIZE};

/// Channel capacity for the outbound chunk queue.
pub const CHANNEL_CAPACITY: usize = 64;

/// A chunk ready to be written to the pipe.
#[derive(Debug)]
pub struct OutboundChunk {
    /// Pre-encoded header (5 bytes).
    header: [u8; HEADER_SIZE],
    /// Payload bytes (empty for heartbeat and stdin-EOF chunks).
    payload: Bytes,
}

impl OutboundChunk {
    /// Create a new outbound chunk.
    pub fn new(chunk_type: ChunkType, payload: Bytes) -> Self {
        let header = ChunkHeader::new(payload.len() as u32, chunk_type.as_u8());
        Self {
            header: header.encode(),
            payload,
        }
    }

    /// Create an outbound chunk with no payload.
    pub fn empty(chunk_type: ChunkType) -> Self {
        Self::new(chunk_type, Bytes::new())
    }
}

/// Handle for sending chunks to the writer task.
///
/// Cheaply cloneable; every producer that shares the transport's write path
/// holds one. Dropping all handles closes the channel and ends the task.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundChunk>,
}

impl WriterHandle {
    /// Queue a chunk for writing.
    ///
    /// Waits while the channel is full; this is how the writer exerts
    /// backpressure on producers. Fails with [`NailgunError::ConnectionClosed`]
    /// once the writer task has stopped.
    pub async fn send(&self, chunk: OutboundChunk) -> Result<()> {
        self.tx
            .send(chunk)
            .await
            .map_err(|_| NailgunError::ConnectionClosed)
    }

    /// Queue a chunk built from a type and payload.
    pub async fn send_chunk(&self, chunk_type: ChunkType, payload: Bytes) -> Result<()> {
        self.send(OutboundChunk::new(chunk_type, payload)).await
    }

    /// Queue an empty chunk (heartbeat, stdin EOF).
    pub async fn send_empty(&self, chunk_type: ChunkType) -> Result<()> {
        self.send(OutboundChunk::empty(chunk_type)).await
    }
}

/// Spawn the writer task and return a handle for sending chunks.
///
/// The task runs until every [`WriterHandle`] clone is dropped or a write
/// fails; the returned [`JoinHandle`] yields the final result.
pub fn spawn_writer_task<W>(writer: W) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

/// Main writer loop - receives chunks and writes them to the pipe.
async fn writer_loop<W>(mut rx: mpsc::Receiver<OutboundChunk>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(chunk) = rx.recv().await {
        write_chunk(&mut writer, &chunk).await?;
        writer.flush().await?;
    }
    // All handles dropped: clean shutdown.
    Ok(())
}

/// Write one chunk (header + payload) using vectored I/O.
async fn write_chunk<W>(writer: &mut W, chunk: &OutboundChunk) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if chunk.payload.is_empty() {
        writer.write_all(&chunk.header).await?;
        return Ok(());
    }

    let total = HEADER_SIZE + chunk.payload.len();
    let mut written = 0;

    while written < total {
        let slices: Vec<IoSlice<'_>> = if written < HEADER_SIZE {
            vec![
                IoSlice::new(&chunk.header[written..]),
                IoSlice::new(&chunk.payload),
            ]
        } else {
            vec![IoSlice::new(&chunk.payload[written - HEADER_SIZE..])]
        };

        let n = writer.write_vectored(&slices).await?;
        if n == 0 {
            return Err(NailgunError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        written += n;
    }

    Ok(())
}
