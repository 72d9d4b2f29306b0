//! SFTP-specific error type.

use skiff_core::{RemoteError, RemoteErrorKind};
use std::fmt;

/// Categorised SFTP error.
#[derive(Debug, Clone)]
pub struct SftpError {
    pub kind: SftpErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SftpErrorKind {
    /// TCP / DNS failure before the handshake completed.
    Connect,
    /// No authentication method succeeded, key unreadable, agent unavailable.
    Auth,
    /// Socket reset or closed mid-operation.
    Dropped,
    /// Unexpected packet or malformed server reply.
    Protocol,
    /// SFTP status 3.
    Permission,
    /// SFTP status 2.
    NotFound,
    /// Local filesystem error.
    Io,
    /// Cancelled through the token.
    Cancelled,
    /// Catch-all.
    Unknown,
}

pub type SftpResult<T> = Result<T, SftpError>;

impl SftpError {
    pub fn new(kind: SftpErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, message: msg.into() }
    }

    pub fn connect(msg: impl Into<String>) -> Self {
        Self::new(SftpErrorKind::Connect, msg)
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::new(SftpErrorKind::Auth, msg)
    }

    pub fn dropped(msg: impl Into<String>) -> Self {
        Self::new(SftpErrorKind::Dropped, msg)
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::new(SftpErrorKind::Protocol, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(SftpErrorKind::Io, msg)
    }

    pub fn cancelled() -> Self {
        Self::new(SftpErrorKind::Cancelled, "Transfer cancelled")
    }
}

impl fmt::Display for SftpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[SFTP {:?}] {}", self.kind, self.message)
    }
}

impl std::error::Error for SftpError {}

// libssh2 session error codes we care about.
const ERR_SOCKET_SEND: i32 = -7;
const ERR_SOCKET_DISCONNECT: i32 = -13;
const ERR_PROTO: i32 = -14;
const ERR_AUTHENTICATION_FAILED: i32 = -18;
const ERR_CHANNEL_CLOSED: i32 = -26;
const ERR_SOCKET_TIMEOUT: i32 = -30;
const ERR_SOCKET_RECV: i32 = -43;

// SFTP status codes (RFC draft-ietf-secsh-filexfer).
const FX_NO_SUCH_FILE: i32 = 2;
const FX_PERMISSION_DENIED: i32 = 3;

impl From<ssh2::Error> for SftpError {
    fn from(e: ssh2::Error) -> Self {
        use ssh2::ErrorCode;
        let kind = match e.code() {
            ErrorCode::SFTP(FX_NO_SUCH_FILE) => SftpErrorKind::NotFound,
            ErrorCode::SFTP(FX_PERMISSION_DENIED) => SftpErrorKind::Permission,
            ErrorCode::SFTP(_) => SftpErrorKind::Protocol,
            ErrorCode::Session(ERR_AUTHENTICATION_FAILED) => SftpErrorKind::Auth,
            ErrorCode::Session(
                ERR_SOCKET_SEND | ERR_SOCKET_RECV | ERR_SOCKET_DISCONNECT | ERR_SOCKET_TIMEOUT
                | ERR_CHANNEL_CLOSED,
            ) => SftpErrorKind::Dropped,
            ErrorCode::Session(ERR_PROTO) => SftpErrorKind::Protocol,
            ErrorCode::Session(_) => SftpErrorKind::Unknown,
        };
        Self::new(kind, e.message())
    }
}

impl From<std::io::Error> for SftpError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match e.kind() {
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => Self::dropped(e.to_string()),
            ErrorKind::TimedOut => Self::dropped(format!("I/O timeout: {}", e)),
            _ => Self::io(e.to_string()),
        }
    }
}

impl From<SftpError> for RemoteError {
    fn from(e: SftpError) -> Self {
        let kind = match e.kind {
            SftpErrorKind::Connect => RemoteErrorKind::NetworkUnreachable,
            SftpErrorKind::Auth => RemoteErrorKind::AuthFailed,
            SftpErrorKind::Dropped => RemoteErrorKind::NetworkDropped,
            SftpErrorKind::Protocol => RemoteErrorKind::Protocol,
            SftpErrorKind::Permission => RemoteErrorKind::Permission,
            SftpErrorKind::NotFound => RemoteErrorKind::NotFound,
            SftpErrorKind::Cancelled => RemoteErrorKind::Cancelled,
            SftpErrorKind::Io | SftpErrorKind::Unknown => RemoteErrorKind::Internal,
        };
        RemoteError::new(kind, e.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_classify() {
        let e: SftpError =
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe").into();
        assert_eq!(e.kind, SftpErrorKind::Dropped);
    }

    #[test]
    fn maps_into_remote_taxonomy() {
        let remote: RemoteError = SftpError::auth("denied").into();
        assert_eq!(remote.kind, RemoteErrorKind::AuthFailed);
        let remote: RemoteError = SftpError::cancelled().into();
        assert!(remote.is_cancelled());
    }
}
