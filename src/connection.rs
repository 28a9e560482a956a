//! Connection builder and public façade.
//!
//! The [`ConnectionBuilder`] provides a fluent API for configuring streams,
//! environment, and heartbeat cadence. The [`Connection`] runs one command
//! per connection:
//! 1. Connect the local transport (Unix socket / named pipe)
//! 2. `send_command` — setup chunks, steady-state multiplexing, exit code
//! 3. `close` — teardown, guaranteed not to leak the transport or tasks
//!
//! # Example
//!
//! ```ignore
//! use nailgun_client::Connection;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut conn = Connection::builder()
//!         .stdout(tokio::io::stdout())
//!         .stderr(tokio::io::stderr())
//!         .connect("local:/tmp/nailgun.sock")
//!         .await?;
//!
//!     let exit_code = conn.send_command("ng-stats", &[]).await?;
//!     conn.close().await;
//!     std::process::exit(exit_code);
//! }
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;

use crate::error::{NailgunError, Result};
use crate::heartbeat::DEFAULT_HEARTBEAT_INTERVAL;
use crate::session::{InputStream, OutputStream, Session, SessionOptions};
use crate::transport::{Address, PipeStream};
use crate::writer::spawn_writer_task;

/// Builder for configuring and opening a Nailgun connection.
///
/// By default the full environment of the invoking process is forwarded,
/// the working directory is the process's current directory, all three
/// streams are absent, and heartbeats run at the default cadence.
pub struct ConnectionBuilder {
    working_dir: Option<String>,
    environment: BTreeMap<String, String>,
    heartbeat_interval: Duration,
    stdin: Option<InputStream>,
    stdout: Option<OutputStream>,
    stderr: Option<OutputStream>,
}

impl ConnectionBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            working_dir: None,
            environment: std::env::vars().collect(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            stdin: None,
            stdout: None,
            stderr: None,
        }
    }

    /// Set the working directory sent to the server.
    ///
    /// Default: the current directory of this process.
    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add or override one environment entry.
    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(name.into(), value.into());
        self
    }

    /// Clear the inherited environment; the server receives only entries
    /// added with [`env`](Self::env) afterwards.
    pub fn env_clear(mut self) -> Self {
        self.environment.clear();
        self
    }

    /// Provide a stdin source, forwarded when the server requests input.
    ///
    /// Absent by default: the first input request is answered with an
    /// end-of-input marker.
    pub fn stdin(mut self, reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        self.stdin = Some(Box::new(reader));
        self
    }

    /// Provide a stdout sink. Absent by default (stdout chunks discarded).
    pub fn stdout(mut self, writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        self.stdout = Some(Box::new(writer));
        self
    }

    /// Provide a stderr sink. Absent by default (stderr chunks discarded).
    pub fn stderr(mut self, writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        self.stderr = Some(Box::new(writer));
        self
    }

    /// Set the heartbeat interval. `Duration::ZERO` disables heartbeats;
    /// use it only when the server-side timeout is disabled or irrelevant.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Connect to `local:<path-or-pipe-name>` and return the connection.
    pub async fn connect(self, address: &str) -> Result<Connection> {
        let address = Address::parse(address)?;
        let stream = PipeStream::connect(&address).await?;
        tracing::debug!(%address, "connected");

        let (read_half, write_half) = stream.into_split();
        let (writer, writer_task) = spawn_writer_task(write_half);

        let working_dir = match self.working_dir {
            Some(dir) => dir,
            None => std::env::current_dir()?.to_string_lossy().into_owned(),
        };

        let options = SessionOptions {
            working_dir,
            environment: self.environment.into_iter().collect(),
            heartbeat_interval: self.heartbeat_interval,
            stdin: self.stdin,
            stdout: self.stdout,
            stderr: self.stderr,
        };

        let reader: InputStream = Box::new(read_half);
        Ok(Connection {
            address,
            session: Some(Session::new(reader, writer, options)),
            writer_task: Some(writer_task),
        })
    }
}

impl Default for ConnectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// An open connection to a Nailgun server.
///
/// Single-use: one command, one exit code, then teardown. Dropping the
/// connection releases the transport and stops the background writer even
/// if [`close`](Self::close) was never awaited.
pub struct Connection {
    address: Address,
    session: Option<Session<InputStream>>,
    writer_task: Option<JoinHandle<Result<()>>>,
}

impl Connection {
    /// Create a new connection builder.
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::new()
    }

    /// The address this connection was opened against.
    pub fn address(&self) -> &str {
        self.address.as_str()
    }

    /// Run exactly one command to completion and return its exit code.
    ///
    /// A nonzero exit code is ordinary data, not an error; protocol or
    /// transport failures surface as errors with no exit code. Calling this
    /// twice fails with [`NailgunError::CommandAlreadySent`] without
    /// touching the wire.
    pub async fn send_command(&mut self, command: &str, args: &[String]) -> Result<i32> {
        let session = self
            .session
            .take()
            .ok_or(NailgunError::CommandAlreadySent)?;
        session.run(command, args).await
    }

    /// Tear the connection down: release the transport and wait for the
    /// background writer to finish. Safe to call multiple times.
    pub async fn close(&mut self) {
        // Dropping the session closes the read half and the last writer
        // handle, which ends the writer task's channel.
        self.session.take();
        if let Some(task) = self.writer_task.take() {
            if let Ok(Err(e)) = task.await {
                tracing::debug!("writer task ended with error during close: {e}");
            }
        }
    }

    /// Ask the server at `address` to shut down, by running the `ng-stop`
    /// nail over a throwaway connection.
    ///
    /// This is an application-level convention, not a protocol primitive.
    /// Best effort: the server usually dies before sending an exit chunk,
    /// so command errors are ignored; only connect failures surface.
    pub async fn stop_server(address: &str) -> Result<()> {
        let mut conn = Connection::builder()
            .heartbeat_interval(Duration::ZERO)
            .connect(address)
            .await?;
        let _ = conn.send_command("ng-stop", &[]).await;
        conn.close().await;
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // Without an executor to await on, abort the writer outright so a
        // never-closed connection still cannot leak its task.
        if let Some(task) = self.writer_task.take() {
            task.abort();
        }
    }
}
