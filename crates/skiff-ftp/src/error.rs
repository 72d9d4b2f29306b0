//! FTP-specific error type.

use skiff_core::{RemoteError, RemoteErrorKind};
use std::fmt;

/// Categorised FTP error.
#[derive(Debug, Clone)]
pub struct FtpError {
    pub kind: FtpErrorKind,
    pub message: String,
    /// FTP reply code that triggered the error, if any.
    pub code: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FtpErrorKind {
    /// TCP / DNS resolution failure.
    ConnectionFailed,
    /// AUTH TLS / TLS handshake failure.
    TlsFailed,
    /// Wrong username/password.
    AuthFailed,
    /// Server returned 4xx/5xx for a command.
    CommandRejected,
    /// PASV/EPSV data connection could not be established.
    DataChannelFailed,
    /// Transfer aborted or incomplete.
    TransferFailed,
    /// Un-parseable server reply.
    ProtocolError,
    /// Local I/O error.
    IoError,
    /// Operation timed out.
    Timeout,
    /// Control connection closed by the server.
    Disconnected,
    /// Permission denied on the server.
    PermissionDenied,
    /// File/directory not found on the server.
    NotFound,
    /// Cancelled through the token.
    Cancelled,
}

pub type FtpResult<T> = Result<T, FtpError>;

impl FtpError {
    pub fn new(kind: FtpErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, message: msg.into(), code: None }
    }

    // ── Convenience constructors ─────────────────────────────────

    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::ConnectionFailed, msg)
    }

    pub fn tls_failed(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::TlsFailed, msg)
    }

    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::AuthFailed, msg)
    }

    pub fn data_channel(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::DataChannelFailed, msg)
    }

    pub fn transfer_failed(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::TransferFailed, msg)
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::ProtocolError, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Timeout, msg)
    }

    pub fn disconnected(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Disconnected, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::NotFound, msg)
    }

    pub fn cancelled() -> Self {
        Self::new(FtpErrorKind::Cancelled, "Transfer cancelled")
    }

    /// Classify an FTP reply code into the most appropriate error kind.
    pub fn from_reply(code: u16, text: &str) -> Self {
        let kind = match code {
            421 => FtpErrorKind::Disconnected,
            425 | 426 => FtpErrorKind::DataChannelFailed,
            430 | 530 | 532 => FtpErrorKind::AuthFailed,
            450 | 550 => {
                let lower = text.to_lowercase();
                if lower.contains("permission") || lower.contains("denied") {
                    FtpErrorKind::PermissionDenied
                } else if lower.contains("not found")
                    || lower.contains("no such")
                    || lower.contains("does not exist")
                {
                    FtpErrorKind::NotFound
                } else {
                    FtpErrorKind::CommandRejected
                }
            }
            451 | 452 | 552 | 551 => FtpErrorKind::TransferFailed,
            _ => FtpErrorKind::CommandRejected,
        };
        Self { kind, message: text.to_string(), code: Some(code) }
    }
}

impl fmt::Display for FtpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "[FTP {:?} {}] {}", self.kind, code, self.message),
            None => write!(f, "[FTP {:?}] {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for FtpError {}

impl From<std::io::Error> for FtpError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::TimedOut {
            Self::timeout(format!("I/O timeout: {}", e))
        } else {
            Self::new(FtpErrorKind::IoError, e.to_string())
        }
    }
}

impl From<native_tls::Error> for FtpError {
    fn from(e: native_tls::Error) -> Self {
        Self::tls_failed(e.to_string())
    }
}

impl From<FtpError> for RemoteError {
    fn from(e: FtpError) -> Self {
        let kind = match e.kind {
            FtpErrorKind::ConnectionFailed => RemoteErrorKind::NetworkUnreachable,
            FtpErrorKind::TlsFailed => RemoteErrorKind::TlsFailure,
            FtpErrorKind::AuthFailed => RemoteErrorKind::AuthFailed,
            FtpErrorKind::PermissionDenied => RemoteErrorKind::Permission,
            FtpErrorKind::NotFound => RemoteErrorKind::NotFound,
            FtpErrorKind::Cancelled => RemoteErrorKind::Cancelled,
            FtpErrorKind::ProtocolError | FtpErrorKind::CommandRejected => {
                RemoteErrorKind::Protocol
            }
            FtpErrorKind::Disconnected
            | FtpErrorKind::Timeout
            | FtpErrorKind::DataChannelFailed
            | FtpErrorKind::TransferFailed => RemoteErrorKind::NetworkDropped,
            FtpErrorKind::IoError => RemoteErrorKind::Internal,
        };
        RemoteError::new(kind, e.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_classification() {
        assert_eq!(FtpError::from_reply(530, "Login incorrect").kind, FtpErrorKind::AuthFailed);
        assert_eq!(FtpError::from_reply(421, "Timeout").kind, FtpErrorKind::Disconnected);
        assert_eq!(FtpError::from_reply(425, "Can't open data connection").kind, FtpErrorKind::DataChannelFailed);
        assert_eq!(
            FtpError::from_reply(550, "No such file or directory").kind,
            FtpErrorKind::NotFound
        );
        assert_eq!(
            FtpError::from_reply(550, "Permission denied").kind,
            FtpErrorKind::PermissionDenied
        );
        assert_eq!(FtpError::from_reply(552, "Quota exceeded").kind, FtpErrorKind::TransferFailed);
    }

    #[test]
    fn maps_into_remote_taxonomy() {
        let remote: RemoteError = FtpError::from_reply(530, "no").into();
        assert_eq!(remote.kind, RemoteErrorKind::AuthFailed);
        let remote: RemoteError = FtpError::tls_failed("handshake").into();
        assert_eq!(remote.kind, RemoteErrorKind::TlsFailure);
        let remote: RemoteError = FtpError::disconnected("reset").into();
        assert_eq!(remote.kind, RemoteErrorKind::NetworkDropped);
    }
}
