//! Transport error taxonomy.
//!
//! Transport failures are fatal to the affected listener or connection and are
//! surfaced to the caller that requested the start; the caller owns teardown
//! and any retry decision. Only three shapes matter to callers: the bind port
//! is taken, the peer refused, or something else went wrong.

use std::net::SocketAddr;
use thiserror::Error;

/// Main transport error type.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The requested bind address is already taken
    #[error("address in use: {addr}")]
    AddressInUse { addr: SocketAddr },

    /// The remote peer refused the connection
    #[error("connection refused: {addr}")]
    ConnectionRefused { addr: SocketAddr },

    /// Anything else - carries the underlying cause
    #[error("transport error: {message}")]
    Unknown {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

impl TransportError {
    /// Classify an I/O error against the address being bound/connected.
    pub fn from_io(err: std::io::Error, addr: SocketAddr) -> Self {
        match err.kind() {
            std::io::ErrorKind::AddrInUse => Self::AddressInUse { addr },
            std::io::ErrorKind::ConnectionRefused => Self::ConnectionRefused { addr },
            _ => Self::Unknown {
                message: format!("i/o failure on {addr}"),
                source: Some(err),
            },
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown {
            message: message.into(),
            source: None,
        }
    }
}

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
