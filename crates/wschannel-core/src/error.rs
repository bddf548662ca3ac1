//! Unified error types for wschannel.
//!
//! Setup and connect failures are reported as values. Registry invariant
//! violations have their own type so that the server can treat them as logic
//! errors instead of runtime conditions.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use crate::registry::ConnectionId;
use crate::state::ChannelMode;

// =============================================================================
// Channel Errors
// =============================================================================

/// Errors that can occur in channel operations.
#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    /// A certificate or key file does not exist.
    #[error("certificate file not found: {}", .0.display())]
    CertificateNotFound(PathBuf),

    /// TLS material could not be loaded or configured.
    #[error(transparent)]
    Tls(#[from] TlsError),

    /// The address is not a valid WebSocket URL.
    #[error("invalid address '{address}': {reason}")]
    InvalidAddress {
        /// The rejected address.
        address: String,
        /// Reason for rejection.
        reason: String,
    },

    /// The URL scheme does not match the channel mode.
    #[error("scheme '{scheme}' is not accepted by a {mode} channel")]
    UnsupportedScheme {
        /// The scheme found in the address.
        scheme: String,
        /// Mode of the channel that rejected it.
        mode: ChannelMode,
    },

    /// Connection or handshake failed.
    #[error("connection failed: {url} - {reason}")]
    ConnectFailed {
        /// The URL that failed to connect.
        url: String,
        /// Reason for failure.
        reason: String,
    },

    /// Another connect attempt is still outstanding.
    #[error("a connect attempt is already in progress")]
    ConnectInProgress,

    /// The connect attempt was cancelled by `close`.
    #[error("connect attempt cancelled")]
    Cancelled,

    /// There is no active connection.
    #[error("channel is not connected")]
    NotConnected,

    /// The channel has been closed and cannot be used again.
    #[error("channel is closed")]
    Closed,

    /// `reconnect` was called before any `connect`.
    #[error("no address to reconnect to")]
    NoAddress,

    /// Message send failed.
    #[error("failed to send message: {0}")]
    SendFailed(String),

    /// The listener could not be created.
    #[error("failed to listen on {addr}: {reason}")]
    ListenFailed {
        /// Requested bind address.
        addr: String,
        /// Reason for failure.
        reason: String,
    },

    /// The server channel is already listening.
    #[error("channel is already listening on {0}")]
    AlreadyListening(SocketAddr),

    /// The listen path cannot be served as a single fixed route.
    #[error("invalid listen path '{0}'")]
    InvalidPath(String),
}

// =============================================================================
// TLS Errors
// =============================================================================

/// Errors that can occur while loading TLS material.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TlsError {
    /// Reading a PEM file failed.
    #[error("TLS I/O error on {}: {reason}", .path.display())]
    Io {
        /// The file being read.
        path: PathBuf,
        /// Underlying I/O error.
        reason: String,
    },

    /// The file contained no usable certificate.
    #[error("no certificates found in {}", .0.display())]
    NoCertificatesFound(PathBuf),

    /// The file contained no private key.
    #[error("no private key found in {}", .0.display())]
    NoPrivateKeyFound(PathBuf),

    /// rustls rejected the configuration.
    #[error("TLS configuration error: {0}")]
    Configuration(String),
}

// =============================================================================
// Registry Errors
// =============================================================================

/// Violations of the connection registry invariants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The connection is already registered.
    #[error("connection {0} is already registered")]
    Duplicate(ConnectionId),

    /// The connection is not registered.
    #[error("connection {0} is not registered")]
    Unknown(ConnectionId),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Result type for TLS loading.
pub type TlsResult<T> = Result<T, TlsError>;
