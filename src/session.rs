//! Session state machine: setup phase, then steady-state multiplexing.
//!
//! A session runs exactly one command. It first writes the setup chunks in
//! the order the server consumes them (`E* D A* C`), then loops decoding
//! server chunks: stdout/stderr payloads go to the caller's sinks, `S`
//! requests pull one buffer of stdin onto the wire, and the `X` chunk ends
//! the session with the remote exit code. Anything else is a protocol
//! violation and fatal.
//!
//! Stdin is paced by the server (pull model): the client only sends a `0`
//! chunk in answer to an `S` request, which is the protocol's backpressure
//! mechanism against a command that is slow to consume input.

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{NailgunError, Result};
use crate::heartbeat::{spawn_heartbeat, DEFAULT_HEARTBEAT_INTERVAL};
use crate::protocol::{Chunk, ChunkBuffer, ChunkType, STDIN_BUFFER_SIZE};
use crate::writer::WriterHandle;

/// Read buffer size for the steady-state loop.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Caller-supplied stdin source.
pub type InputStream = Box<dyn AsyncRead + Send + Unpin>;
/// Caller-supplied stdout/stderr sink.
pub type OutputStream = Box<dyn AsyncWrite + Send + Unpin>;

/// Per-session configuration and stream endpoints.
///
/// Each stream is independently optional; an absent sink means the
/// corresponding chunk payloads are discarded, and an absent stdin means
/// the first `S` request is answered with an immediate end-of-input marker.
pub struct SessionOptions {
    /// Working directory sent in the `D` chunk.
    pub working_dir: String,
    /// Environment entries sent as `E` chunks (keys unique, order preserved).
    pub environment: Vec<(String, String)>,
    /// Heartbeat cadence; `Duration::ZERO` disables heartbeats entirely.
    pub heartbeat_interval: Duration,
    /// Stdin source, forwarded on server request.
    pub stdin: Option<InputStream>,
    /// Stdout sink.
    pub stdout: Option<OutputStream>,
    /// Stderr sink.
    pub stderr: Option<OutputStream>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            working_dir: ".".to_string(),
            environment: Vec::new(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            stdin: None,
            stdout: None,
            stderr: None,
        }
    }
}

/// One command execution over an established transport.
///
/// The session owns the transport's read half exclusively; all writes go
/// through the shared [`WriterHandle`] so they serialize with heartbeats.
pub struct Session<R> {
    reader: R,
    writer: WriterHandle,
    options: SessionOptions,
    /// Set once stdin reported EOF; later `S` requests elicit nothing.
    stdin_exhausted: bool,
}

impl<R: AsyncRead + Unpin> Session<R> {
    /// Create a session over an established transport.
    pub fn new(reader: R, writer: WriterHandle, options: SessionOptions) -> Self {
        Self {
            reader,
            writer,
            options,
            stdin_exhausted: false,
        }
    }

    /// Run one command to completion and return its exit code.
    ///
    /// Consumes the session: the protocol allows a single command per
    /// connection. The heartbeat task (if any) is stopped on every return
    /// path before the transport can be torn down.
    pub async fn run(mut self, command: &str, args: &[String]) -> Result<i32> {
        self.send_setup(command, args).await?;

        let heartbeat = spawn_heartbeat(self.writer.clone(), self.options.heartbeat_interval);
        tracing::debug!(command, heartbeat = heartbeat.is_some(), "entering steady state");

        let result = self.steady_state().await;

        if let Some(heartbeat) = heartbeat {
            heartbeat.stop().await;
        }

        result
    }

    /// Write the setup chunks: `E` per environment entry, `D`, `A` per
    /// argument, `C`. The order is fixed; the server consumes environment
    /// and directory before binding the command.
    async fn send_setup(&mut self, command: &str, args: &[String]) -> Result<()> {
        for (name, value) in &self.options.environment {
            let entry = format!("{name}={value}");
            self.writer
                .send_chunk(ChunkType::Environment, Bytes::from(entry))
                .await?;
        }

        self.writer
            .send_chunk(
                ChunkType::WorkingDirectory,
                Bytes::from(self.options.working_dir.clone()),
            )
            .await?;

        for arg in args {
            self.writer
                .send_chunk(ChunkType::Argument, Bytes::from(arg.clone()))
                .await?;
        }

        self.writer
            .send_chunk(ChunkType::Command, Bytes::from(command.to_string()))
            .await
    }

    /// Steady-state loop: decode server chunks until the exit chunk.
    async fn steady_state(&mut self) -> Result<i32> {
        let mut chunk_buffer = ChunkBuffer::new();
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            let n = self.reader.read(&mut buf).await?;
            if n == 0 {
                let detail = if chunk_buffer.mid_chunk() {
                    "stream truncated mid-chunk"
                } else {
                    "connection closed before exit chunk"
                };
                return Err(NailgunError::Protocol(detail.to_string()));
            }

            for chunk in chunk_buffer.push(&buf[..n])? {
                if let Some(exit_code) = self.dispatch(chunk).await? {
                    // Terminal: nothing further is read or written.
                    return Ok(exit_code);
                }
            }
        }
    }

    /// Handle one server chunk; returns the exit code on `X`.
    async fn dispatch(&mut self, chunk: Chunk) -> Result<Option<i32>> {
        match chunk.chunk_type {
            ChunkType::Stdout => {
                if let Some(stdout) = &mut self.options.stdout {
                    stdout.write_all(chunk.payload()).await?;
                    stdout.flush().await?;
                }
                Ok(None)
            }
            ChunkType::Stderr => {
                if let Some(stderr) = &mut self.options.stderr {
                    stderr.write_all(chunk.payload()).await?;
                    stderr.flush().await?;
                }
                Ok(None)
            }
            ChunkType::SendInput => {
                self.forward_stdin().await?;
                Ok(None)
            }
            ChunkType::Exit => {
                let exit_code = parse_exit_code(chunk.payload())?;
                tracing::debug!(exit_code, "command exited");
                Ok(Some(exit_code))
            }
            other => Err(NailgunError::Protocol(format!(
                "unexpected chunk type '{}' from server",
                other.as_u8() as char
            ))),
        }
    }

    /// Answer one `S` request with at most one stdin chunk.
    ///
    /// On source EOF a single `.` chunk is sent; afterwards further `S`
    /// requests elicit nothing for the rest of the session.
    async fn forward_stdin(&mut self) -> Result<()> {
        if self.stdin_exhausted {
            return Ok(());
        }

        let Some(stdin) = &mut self.options.stdin else {
            self.stdin_exhausted = true;
            return self.writer.send_empty(ChunkType::StdinEof).await;
        };

        let mut buf = vec![0u8; STDIN_BUFFER_SIZE];
        let n = stdin.read(&mut buf).await?;
        if n == 0 {
            self.stdin_exhausted = true;
            self.writer.send_empty(ChunkType::StdinEof).await
        } else {
            buf.truncate(n);
            self.writer
                .send_chunk(ChunkType::Stdin, Bytes::from(buf))
                .await
        }
    }
}

/// Parse the `X` chunk payload: the exit code as decimal text.
fn parse_exit_code(payload: &[u8]) -> Result<i32> {
    let text = std::str::from_utf8(payload)
        .map_err(|_| NailgunError::Protocol("exit chunk payload is not UTF-8".to_string()))?;
    text.trim().parse::<i32>().map_err(|_| {
        NailgunError::Protocol(format!("exit chunk payload is not a decimal code: {text:?}"))
    })
}
