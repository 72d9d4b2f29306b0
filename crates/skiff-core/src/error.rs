//! Dispatcher-boundary error type.
//!
//! Backends report their own narrow failure kinds; the dispatcher
//! normalises them into this taxonomy before anything reaches the queue
//! or a subscriber.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Categorised remote-operation error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// Wrong credentials, unreadable key file, wrong passphrase, agent unavailable.
    AuthFailed,
    /// TCP / DNS resolution failure before a connection existed.
    NetworkUnreachable,
    /// Connection lost mid-operation (reset, closed during transfer, timeout).
    NetworkDropped,
    /// TLS handshake or certificate failure.
    TlsFailure,
    /// Server sent something the client could not make sense of.
    Protocol,
    /// Server-side permission denied.
    Permission,
    /// Remote file or directory does not exist.
    NotFound,
    /// No active connection.
    NotConnected,
    /// The active backend does not support the requested capability.
    Unsupported,
    /// Operation cancelled through its token.
    Cancelled,
    /// Cloud bucket exists but access was denied at connect time.
    BucketAccessDenied,
    /// Anything that does not fit a narrower kind.
    Internal,
}

pub type RemoteResult<T> = Result<T, RemoteError>;

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, message: msg.into() }
    }

    // ── Convenience constructors ─────────────────────────────────

    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::AuthFailed, msg)
    }

    pub fn unreachable(msg: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::NetworkUnreachable, msg)
    }

    pub fn dropped(msg: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::NetworkDropped, msg)
    }

    pub fn tls(msg: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::TlsFailure, msg)
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Protocol, msg)
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Permission, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::NotFound, msg)
    }

    pub fn not_connected() -> Self {
        Self::new(RemoteErrorKind::NotConnected, "No active remote connection")
    }

    pub fn unsupported(capability: &str) -> Self {
        Self::new(
            RemoteErrorKind::Unsupported,
            format!("'{}' is not supported by the active backend", capability),
        )
    }

    pub fn cancelled() -> Self {
        Self::new(RemoteErrorKind::Cancelled, "Operation cancelled")
    }

    pub fn bucket_denied(msg: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::BucketAccessDenied, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Internal, msg)
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == RemoteErrorKind::Cancelled
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)
    }
}

impl std::error::Error for RemoteError {}

impl From<std::io::Error> for RemoteError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match e.kind() {
            ErrorKind::ConnectionRefused | ErrorKind::AddrNotAvailable => {
                Self::unreachable(e.to_string())
            }
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::TimedOut
            | ErrorKind::UnexpectedEof => Self::dropped(e.to_string()),
            ErrorKind::PermissionDenied => Self::permission(e.to_string()),
            ErrorKind::NotFound => Self::not_found(e.to_string()),
            _ => Self::internal(e.to_string()),
        }
    }
}
