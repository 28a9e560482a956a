//! Transport module - platform-specific pipe/socket handling.
//!
//! Provides abstraction over:
//! - Unix Domain Sockets (Linux/macOS)
//! - Named Pipes (Windows)
//!
//! Addresses use the `local:<identifier>` syntax shared by all Nailgun
//! clients; the identifier is a filesystem path on Unix and a pipe name on
//! Windows (rendered as `\\.\pipe\<identifier>` at the OS level).

mod pipe;

pub use pipe::PipeStream;

use crate::error::{NailgunError, Result};

/// Address scheme prefix for local transports.
const LOCAL_SCHEME: &str = "local:";

/// A parsed transport address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    /// The address as given (`local:<identifier>`), kept for error messages.
    raw: String,
    /// Platform endpoint: socket path on Unix, `\\.\pipe\<name>` on Windows.
    endpoint: String,
}

impl Address {
    /// Parse an address of the form `local:<path-or-pipe-name>`.
    pub fn parse(address: &str) -> Result<Self> {
        let identifier = address
            .strip_prefix(LOCAL_SCHEME)
            .ok_or_else(|| NailgunError::InvalidAddress(address.to_string()))?;

        if identifier.is_empty() {
            return Err(NailgunError::InvalidAddress(address.to_string()));
        }

        Ok(Self {
            raw: address.to_string(),
            endpoint: render_endpoint(identifier),
        })
    }

    /// The address as originally given.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The OS-level endpoint this address resolves to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(unix)]
fn render_endpoint(identifier: &str) -> String {
    identifier.to_string()
}

#[cfg(windows)]
fn render_endpoint(identifier: &str) -> String {
    if identifier.starts_with(r"\\.\pipe\") {
        identifier.to_string()
    } else {
        format!(r"\\.\pipe\{}", identifier)
    }
}
