//! FTP / FTPS backend.
//!
//! A from-scratch async client over tokio TCP with optional TLS (explicit
//! `AUTH TLS`, RFC 4217). One shared control client serves metadata; every
//! bulk transfer runs on a freshly connected client with its own control
//! and data connection — FTP servers tolerate little else.
//!
//! Certificate verification is disabled for FTPS: self-signed certificates
//! are the norm on the servers this engine talks to.

pub mod client;
pub mod codec;
pub mod data;
pub mod error;
pub mod parser;
pub mod tls;
pub mod types;

pub use client::FtpClient;
pub use error::{FtpError, FtpErrorKind, FtpResult};
pub use types::{FtpConfig, FtpResponse, FtpSecurityMode, ServerFeatures};
