//! S3 error type following the AWS error model.

use skiff_core::{RemoteError, RemoteErrorKind};
use std::fmt;

/// Error from an S3 API call: the AWS error code plus HTTP status.
#[derive(Debug, Clone)]
pub struct S3Error {
    /// AWS error code (e.g. "NoSuchKey", "AccessDenied").
    pub code: String,
    pub message: String,
    /// HTTP status, 0 when the request never reached the server.
    pub status: u16,
}

pub type S3Result<T> = Result<T, S3Error>;

impl S3Error {
    pub fn new(code: &str, message: impl Into<String>, status: u16) -> Self {
        Self { code: code.to_string(), message: message.into(), status }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new("TransportError", message, 0)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new("ParseError", message, 200)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new("LocalIoError", message, 0)
    }

    pub fn cancelled() -> Self {
        Self::new("RequestCancelled", "Transfer cancelled", 0)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404 || self.code == "NoSuchKey" || self.code == "NoSuchBucket"
    }

    pub fn is_access_denied(&self) -> bool {
        self.status == 403 || self.code == "AccessDenied"
    }
}

impl fmt::Display for S3Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S3 [{}] {} (HTTP {})", self.code, self.message, self.status)
    }
}

impl std::error::Error for S3Error {}

impl From<reqwest::Error> for S3Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            Self::new("EndpointUnreachable", e.to_string(), 0)
        } else if e.is_timeout() {
            Self::new("RequestTimeout", e.to_string(), 0)
        } else {
            Self::transport(e.to_string())
        }
    }
}

impl From<std::io::Error> for S3Error {
    fn from(e: std::io::Error) -> Self {
        Self::io(e.to_string())
    }
}

impl From<S3Error> for RemoteError {
    fn from(e: S3Error) -> Self {
        let kind = match e.code.as_str() {
            "RequestCancelled" => RemoteErrorKind::Cancelled,
            "EndpointUnreachable" => RemoteErrorKind::NetworkUnreachable,
            "RequestTimeout" | "TransportError" => RemoteErrorKind::NetworkDropped,
            "InvalidAccessKeyId" | "SignatureDoesNotMatch" | "ExpiredToken" => {
                RemoteErrorKind::AuthFailed
            }
            "LocalIoError" => RemoteErrorKind::Internal,
            "ParseError" => RemoteErrorKind::Protocol,
            _ if e.is_not_found() => RemoteErrorKind::NotFound,
            _ if e.is_access_denied() => RemoteErrorKind::Permission,
            _ if e.status >= 500 => RemoteErrorKind::NetworkDropped,
            _ => RemoteErrorKind::Protocol,
        };
        RemoteError::new(kind, e.to_string())
    }
}
