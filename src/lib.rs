//! # nailgun-client
//!
//! Rust client for the Nailgun protocol.
//!
//! A Nailgun server is a long-lived process that executes short-lived
//! commands ("nails") without per-invocation startup cost. This crate
//! connects over a local transport (Unix domain socket or Windows named
//! pipe), sends one command with its arguments, environment, and working
//! directory, multiplexes the server's stdout/stderr back to local sinks,
//! forwards stdin on server request, answers liveness heartbeats, and
//! returns the remote exit code.
//!
//! ## Architecture
//!
//! - **Wire protocol**: length-prefixed, typed chunks (4-byte big-endian
//!   length, 1-byte type tag, payload)
//! - **Write path**: a single writer task fed by a channel, so heartbeats
//!   and payload chunks never interleave mid-frame
//! - **Read path**: the session's foreground loop, which also paces stdin
//!   via the server's pull requests
//!
//! ## Example
//!
//! ```ignore
//! use nailgun_client::Connection;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut conn = Connection::builder()
//!         .stdout(tokio::io::stdout())
//!         .connect("local:/tmp/nailgun.sock")
//!         .await?;
//!
//!     let exit_code = conn.send_command("ng-version", &[]).await?;
//!     conn.close().await;
//!     println!("server exited with {exit_code}");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod protocol;
pub mod transport;

mod connection;
mod heartbeat;
mod session;
mod writer;

pub use connection::{Connection, ConnectionBuilder};
pub use error::{NailgunError, Result};
pub use heartbeat::DEFAULT_HEARTBEAT_INTERVAL;
pub use session::{InputStream, OutputStream, Session, SessionOptions};
pub use writer::{spawn_writer_task, OutboundChunk, WriterHandle};
