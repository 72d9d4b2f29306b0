//! TLS helpers for explicit FTPS (RFC 4217).

use crate::codec::{ControlStream, FtpCodec};
use crate::error::{FtpError, FtpResult};
use tokio::net::TcpStream;
use tokio_native_tls::TlsConnector;

/// Build a connector. Verification is disabled when `accept_invalid_certs`
/// is set: self-signed FTPS servers are the common case for this engine.
pub fn build_tls_connector(accept_invalid_certs: bool) -> FtpResult<TlsConnector> {
    let mut builder = native_tls::TlsConnector::builder();
    if accept_invalid_certs {
        builder.danger_accept_invalid_certs(true);
        builder.danger_accept_invalid_hostnames(true);
    }
    Ok(TlsConnector::from(builder.build()?))
}

/// Upgrade a plain control connection after a successful `AUTH TLS`.
pub async fn upgrade_to_tls(
    codec: FtpCodec,
    host: &str,
    accept_invalid_certs: bool,
) -> FtpResult<FtpCodec> {
    let tcp = match codec.into_inner() {
        ControlStream::Plain(tcp) => tcp,
        ControlStream::Tls(_) => {
            return Err(FtpError::protocol("Control connection is already TLS"))
        }
    };
    let connector = build_tls_connector(accept_invalid_certs)?;
    let tls = connector
        .connect(host, tcp)
        .await
        .map_err(|e| FtpError::tls_failed(format!("AUTH TLS handshake: {}", e)))?;
    Ok(FtpCodec::from_tls(tls))
}

/// Wrap a data connection in TLS (`PROT P`).
pub async fn wrap_data_stream(
    tcp: TcpStream,
    host: &str,
    accept_invalid_certs: bool,
) -> FtpResult<tokio_native_tls::TlsStream<TcpStream>> {
    let connector = build_tls_connector(accept_invalid_certs)?;
    connector
        .connect(host, tcp)
        .await
        .map_err(|e| FtpError::tls_failed(format!("Data channel TLS: {}", e)))
}
