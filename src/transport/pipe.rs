//! Platform-specific pipe/socket implementation.
//!
//! - Unix: Unix Domain Socket
//! - Windows: Named Pipe
//!
//! # Example
//!
//! ```ignore
//! use nailgun_client::transport::{Address, PipeStream};
//!
//! let addr = Address::parse("local:/tmp/ng.sock")?;
//! let stream = PipeStream::connect(&addr).await?;
//! let (reader, writer) = stream.into_split();
//! ```

use tokio::io::{AsyncRead, AsyncWrite};

use super::Address;
use crate::error::{NailgunError, Result};

// ============================================================================
// Unix Implementation
// ============================================================================

#[cfg(unix)]
mod unix_impl {
    use super::*;
    use tokio::net::UnixStream;

    /// Unix Domain Socket stream (connected).
    pub struct PipeStream {
        stream: UnixStream,
    }

    impl PipeStream {
        /// Connect to a Unix socket endpoint.
        ///
        /// Fails with [`NailgunError::Connection`] if the socket file does
        /// not exist or nothing is listening on it.
        pub async fn connect(address: &Address) -> Result<Self> {
            let stream = UnixStream::connect(address.endpoint())
                .await
                .map_err(|source| NailgunError::Connection {
                    address: address.as_str().to_string(),
                    source,
                })?;
            Ok(Self { stream })
        }

        /// Split into read and write halves.
        pub fn into_split(
            self,
        ) -> (
            impl AsyncRead + Send + Unpin + 'static,
            impl AsyncWrite + Send + Unpin + 'static,
        ) {
            self.stream.into_split()
        }
    }
}

// ============================================================================
// Windows Implementation
// ============================================================================

#[cfg(windows)]
mod windows_impl {
    use super::*;
    use tokio::net::windows::named_pipe::{ClientOptions, NamedPipeClient};

    /// Windows Named Pipe stream (connected).
    pub struct PipeStream {
        pipe: NamedPipeClient,
    }

    impl PipeStream {
        /// Connect to a named pipe endpoint.
        ///
        /// Fails with [`NailgunError::Connection`] if the pipe does not
        /// exist or refuses the connection.
        pub async fn connect(address: &Address) -> Result<Self> {
            let pipe = ClientOptions::new().open(address.endpoint()).map_err(
                |source| NailgunError::Connection {
                    address: address.as_str().to_string(),
                    source,
                },
            )?;
            Ok(Self { pipe })
        }

        /// Split into read and write halves.
        pub fn into_split(
            self,
        ) -> (
            impl AsyncRead + Send + Unpin + 'static,
            impl AsyncWrite + Send + Unpin + 'static,
        ) {
            tokio::io::split(self.pipe)
        }
    }
}

// ============================================================================
// Platform-independent re-exports
// ============================================================================

#[cfg(unix)]
pub use unix_impl::PipeStream;

#[cfg(windows)]
pub use windows_impl::PipeStream;
