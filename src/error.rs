//! Error types for nailgun-client.

use thiserror::Error;

/// Main error type for all nailgun client operations.
#[derive(Debug, Error)]
pub enum NailgunError {
    /// Transport could not be established (endpoint missing or refused).
    #[error("failed to connect to {address}: {source}")]
    Connection {
        /// The `local:<...>` address that was dialed.
        address: String,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// The address is not of the form `local:<path-or-pipe-name>`.
    #[error("invalid transport address: {0}")]
    InvalidAddress(String),

    /// I/O error during socket/pipe operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed frame, unexpected chunk type, or truncated stream.
    /// Always fatal to the session.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Connection closed while the session still expected traffic.
    #[error("connection closed")]
    ConnectionClosed,

    /// `send_command` was called twice on the same connection.
    #[error("a command was already sent on this connection")]
    CommandAlreadySent,
}

/// Result type alias using NailgunError.
pub type Result<T> = std::result::Result<T, NailgunError>;
