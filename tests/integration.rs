//! Integration tests for nailgun-client.
//!
//! Runs the full client against an in-process fake Nailgun server listening
//! on a Unix socket in a temp directory. The fake server implements the
//! handful of nails the original test harness exercises: an exit-code nail,
//! an echo nail driven by stdin pull requests, and a heartbeat nail that
//! prints one `H` per heartbeat it receives.

#![cfg(unix)]

use std::collections::VecDeque;
use std::time::Duration;

use nailgun_client::protocol::{build_chunk, Chunk, ChunkBuffer, ChunkType};
use nailgun_client::{Connection, NailgunError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

/// Install the log subscriber for `RUST_LOG`-driven test debugging.
/// Safe to call from every test; only the first call installs.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Fake server
// ============================================================================

/// Reads whole chunks off a stream. `next` is cancel-safe: bytes are moved
/// into the pending queue in the same poll that completes the read.
struct ChunkReader<R> {
    reader: R,
    buffer: ChunkBuffer,
    pending: VecDeque<Chunk>,
}

impl<R: AsyncRead + Unpin> ChunkReader<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: ChunkBuffer::new(),
            pending: VecDeque::new(),
        }
    }

    /// Next chunk, or `None` once the peer hangs up.
    async fn next(&mut self) -> Option<Chunk> {
        loop {
            if let Some(chunk) = self.pending.pop_front() {
                return Some(chunk);
            }
            let mut buf = [0u8; 4096];
            let n = self.reader.read(&mut buf).await.ok()?;
            if n == 0 {
                return None;
            }
            self.pending.extend(self.buffer.push(&buf[..n]).unwrap());
        }
    }
}

struct FakeServer {
    address: String,
    _dir: tempfile::TempDir,
    task: JoinHandle<()>,
}

impl FakeServer {
    async fn start() -> Self {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sock");
        let listener = UnixListener::bind(&path).unwrap();

        let task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                if !serve(stream).await {
                    break;
                }
            }
        });

        Self {
            address: format!("local:{}", path.display()),
            _dir: dir,
            task,
        }
    }

    /// Wait for the accept loop to end (it exits after serving `ng-stop`).
    async fn wait(&mut self) {
        (&mut self.task).await.ok();
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Serve one connection. Returns `false` when the server should shut down.
async fn serve(stream: UnixStream) -> bool {
    let (read_half, mut wr) = stream.into_split();
    let mut chunks = ChunkReader::new(read_half);

    // Setup phase: environment, directory, arguments, then the command.
    let mut args: Vec<String> = Vec::new();
    let command;
    loop {
        let Some(chunk) = chunks.next().await else {
            return true;
        };
        match chunk.chunk_type {
            ChunkType::Environment | ChunkType::WorkingDirectory | ChunkType::Heartbeat => {}
            ChunkType::Argument => {
                args.push(String::from_utf8(chunk.payload().to_vec()).unwrap())
            }
            ChunkType::Command => {
                command = String::from_utf8(chunk.payload().to_vec()).unwrap();
                break;
            }
            other => panic!("unexpected chunk during setup: {other:?}"),
        }
    }

    match command.as_str() {
        "ng-stop" => return false,

        // Exit with the code given as the first argument.
        "exit" => {
            let code = args.first().map(String::as_str).unwrap_or("0");
            wr.write_all(&build_chunk(ChunkType::Exit, code.as_bytes()))
                .await
                .unwrap();
        }

        // Print "ok" and exit 0.
        "hello" => {
            wr.write_all(&build_chunk(ChunkType::Stdout, b"ok"))
                .await
                .unwrap();
            wr.write_all(&build_chunk(ChunkType::Exit, b"0"))
                .await
                .unwrap();
        }

        // Pull all of stdin, echo it to stdout, exit 0.
        "echo-stdin" => {
            let mut collected = Vec::new();
            'outer: loop {
                wr.write_all(&build_chunk(ChunkType::SendInput, b""))
                    .await
                    .unwrap();
                loop {
                    let Some(chunk) = chunks.next().await else {
                        return true;
                    };
                    match chunk.chunk_type {
                        ChunkType::Stdin => {
                            collected.extend_from_slice(chunk.payload());
                            continue 'outer;
                        }
                        ChunkType::StdinEof => break 'outer,
                        ChunkType::Heartbeat => {}
                        other => panic!("unexpected chunk while pulling stdin: {other:?}"),
                    }
                }
            }
            wr.write_all(&build_chunk(ChunkType::Stdout, &collected))
                .await
                .unwrap();
            wr.write_all(&build_chunk(ChunkType::Exit, b"0"))
                .await
                .unwrap();
        }

        // Run for the given number of milliseconds, printing one "H" per
        // heartbeat received, then exit 0.
        "heartbeat-nail" => {
            let run_for: u64 = args[0].parse().unwrap();
            let deadline = tokio::time::Instant::now() + Duration::from_millis(run_for);
            loop {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => break,
                    chunk = chunks.next() => match chunk {
                        Some(c) if c.chunk_type == ChunkType::Heartbeat => {
                            wr.write_all(&build_chunk(ChunkType::Stdout, b"H"))
                                .await
                                .unwrap();
                        }
                        Some(_) => {}
                        None => return true,
                    },
                }
            }
            wr.write_all(&build_chunk(ChunkType::Exit, b"0"))
                .await
                .unwrap();
        }

        // Emit some stdout, then hang up without an exit chunk.
        "hang-up" => {
            wr.write_all(&build_chunk(ChunkType::Stdout, b"partial"))
                .await
                .unwrap();
        }

        other => panic!("fake server has no nail named {other:?}"),
    }

    true
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_simple_command() {
    let server = FakeServer::start().await;
    let (sink, mut capture) = tokio::io::duplex(64 * 1024);

    let mut conn = Connection::builder()
        .stdout(sink)
        .connect(&server.address)
        .await
        .unwrap();
    let exit_code = conn.send_command("hello", &[]).await.unwrap();
    conn.close().await;

    assert_eq!(exit_code, 0);

    let mut out = Vec::new();
    capture.read_to_end(&mut out).await.unwrap();
    assert_eq!(out, b"ok");
}

#[tokio::test]
async fn test_exit_code_passthrough() {
    let server = FakeServer::start().await;

    let mut conn = Connection::builder()
        .connect(&server.address)
        .await
        .unwrap();
    let exit_code = conn
        .send_command("exit", &["10".to_string()])
        .await
        .unwrap();
    conn.close().await;

    assert_eq!(exit_code, 10);
}

#[tokio::test]
async fn test_second_command_rejected() {
    let server = FakeServer::start().await;

    let mut conn = Connection::builder()
        .connect(&server.address)
        .await
        .unwrap();
    conn.send_command("exit", &["0".to_string()]).await.unwrap();

    let result = conn.send_command("exit", &["0".to_string()]).await;
    assert!(matches!(result, Err(NailgunError::CommandAlreadySent)));
    conn.close().await;
}

#[tokio::test]
async fn test_stdin_echo() {
    let server = FakeServer::start().await;

    let lines: Vec<String> = (0..100).map(|i| i.to_string()).collect();
    let input = lines.join("\n").into_bytes();
    let (sink, mut capture) = tokio::io::duplex(64 * 1024);

    let mut conn = Connection::builder()
        .stdin(std::io::Cursor::new(input.clone()))
        .stdout(sink)
        .connect(&server.address)
        .await
        .unwrap();
    let exit_code = conn.send_command("echo-stdin", &[]).await.unwrap();
    conn.close().await;

    assert_eq!(exit_code, 0);

    let mut out = Vec::new();
    capture.read_to_end(&mut out).await.unwrap();
    assert_eq!(out, input);
}

#[tokio::test]
async fn test_heartbeats_reach_the_server() {
    let server = FakeServer::start().await;
    let (sink, mut capture) = tokio::io::duplex(64 * 1024);

    let mut conn = Connection::builder()
        .stdout(sink)
        .heartbeat_interval(Duration::from_millis(10))
        .connect(&server.address)
        .await
        .unwrap();
    let exit_code = conn
        .send_command("heartbeat-nail", &["200".to_string()])
        .await
        .unwrap();
    conn.close().await;

    assert_eq!(exit_code, 0);

    let mut out = Vec::new();
    capture.read_to_end(&mut out).await.unwrap();
    let beats = out.iter().filter(|&&b| b == b'H').count();
    assert!(beats >= 5, "expected heartbeats during the nail, got {beats}");
}

#[tokio::test]
async fn test_no_heartbeats_when_disabled() {
    let server = FakeServer::start().await;
    let (sink, mut capture) = tokio::io::duplex(64 * 1024);

    let mut conn = Connection::builder()
        .stdout(sink)
        .heartbeat_interval(Duration::ZERO)
        .connect(&server.address)
        .await
        .unwrap();
    let exit_code = conn
        .send_command("heartbeat-nail", &["150".to_string()])
        .await
        .unwrap();
    conn.close().await;

    assert_eq!(exit_code, 0);

    let mut out = Vec::new();
    capture.read_to_end(&mut out).await.unwrap();
    assert_eq!(out.iter().filter(|&&b| b == b'H').count(), 0);
}

#[tokio::test]
async fn test_disconnect_mid_stream() {
    let server = FakeServer::start().await;
    let (sink, mut capture) = tokio::io::duplex(64 * 1024);

    let mut conn = Connection::builder()
        .stdout(sink)
        .connect(&server.address)
        .await
        .unwrap();
    let result = conn.send_command("hang-up", &[]).await;
    conn.close().await;

    // No exit code: the command fails with a protocol error.
    assert!(matches!(result, Err(NailgunError::Protocol(_))));

    // Output received before the hang-up was still forwarded.
    let mut out = Vec::new();
    capture.read_to_end(&mut out).await.unwrap();
    assert_eq!(out, b"partial");
}

#[tokio::test]
async fn test_stop_server_convention() {
    let mut server = FakeServer::start().await;

    Connection::stop_server(&server.address).await.unwrap();
    server.wait().await;

    // The server is gone; new connections are refused.
    let result = Connection::builder().connect(&server.address).await;
    assert!(matches!(result, Err(NailgunError::Connection { .. })));
}

#[tokio::test]
async fn test_stress_sequential_sessions() {
    let server = FakeServer::start().await;

    for _ in 0..1000 {
        let mut conn = Connection::builder()
            .env_clear()
            .heartbeat_interval(Duration::from_millis(1))
            .connect(&server.address)
            .await
            .unwrap();
        let exit_code = conn.send_command("exit", &["0".to_string()]).await.unwrap();
        assert_eq!(exit_code, 0);
        conn.close().await;
    }
}
