//! Data-channel establishment (RFC 959 + RFC 2428).
//!
//! Passive only: `PASV` with an `EPSV` fallback for servers behind NAT that
//! advertise unroutable PASV addresses. The stream is TLS-wrapped when the
//! control channel is secured (`PROT P`).

use crate::codec::FtpCodec;
use crate::error::{FtpError, FtpResult};
use crate::tls;
use crate::types::FtpSecurityMode;
use regex::Regex;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// A plain or TLS-wrapped data stream.
pub enum DataStream {
    Plain(TcpStream),
    Tls(tokio_native_tls::TlsStream<TcpStream>),
}

impl AsyncRead for DataStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            DataStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            DataStream::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for DataStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            DataStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            DataStream::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            DataStream::Plain(s) => Pin::new(s).poll_flush(cx),
            DataStream::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            DataStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            DataStream::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// Negotiate a data connection with the server.
pub async fn open_data_channel(
    codec: &mut FtpCodec,
    security: FtpSecurityMode,
    host: &str,
    accept_invalid_certs: bool,
    data_timeout: Duration,
) -> FtpResult<DataStream> {
    let tcp = match open_pasv(codec, data_timeout).await {
        Ok(tcp) => tcp,
        Err(_) => open_epsv(codec, host, data_timeout).await?,
    };

    if security != FtpSecurityMode::None {
        let tls = tls::wrap_data_stream(tcp, host, accept_invalid_certs).await?;
        Ok(DataStream::Tls(tls))
    } else {
        Ok(DataStream::Plain(tcp))
    }
}

// ─── PASV ────────────────────────────────────────────────────────────

async fn open_pasv(codec: &mut FtpCodec, data_timeout: Duration) -> FtpResult<TcpStream> {
    let resp = codec.expect_ok("PASV").await?;
    let addr = parse_pasv_response(&resp.text())?;
    timeout(data_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| FtpError::data_channel("PASV data connect timed out"))?
        .map_err(|e| FtpError::data_channel(format!("PASV data connect: {}", e)))
}

/// Parse `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)`.
pub(crate) fn parse_pasv_response(text: &str) -> FtpResult<SocketAddr> {
    let re = Regex::new(r"\((\d+),(\d+),(\d+),(\d+),(\d+),(\d+)\)").unwrap();
    let caps = re
        .captures(text)
        .ok_or_else(|| FtpError::protocol(format!("Cannot parse PASV: {}", text)))?;

    let nums: Vec<u8> = (1..=6)
        .map(|i| {
            caps[i]
                .parse::<u8>()
                .map_err(|_| FtpError::protocol("PASV number out of range"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let ip = IpAddr::from([nums[0], nums[1], nums[2], nums[3]]);
    let port = (nums[4] as u16) * 256 + (nums[5] as u16);
    Ok(SocketAddr::new(ip, port))
}

// ─── EPSV ────────────────────────────────────────────────────────────

async fn open_epsv(
    codec: &mut FtpCodec,
    host: &str,
    data_timeout: Duration,
) -> FtpResult<TcpStream> {
    let resp = codec.expect_ok("EPSV").await?;
    let port = parse_epsv_response(&resp.text())?;
    let addr = format!("{}:{}", host, port);
    timeout(data_timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| FtpError::data_channel("EPSV data connect timed out"))?
        .map_err(|e| FtpError::data_channel(format!("EPSV data connect: {}", e)))
}

/// Parse `229 Entering Extended Passive Mode (|||port|)`.
pub(crate) fn parse_epsv_response(text: &str) -> FtpResult<u16> {
    let re = Regex::new(r"\|\|\|(\d+)\|").unwrap();
    let caps = re
        .captures(text)
        .ok_or_else(|| FtpError::protocol(format!("Cannot parse EPSV: {}", text)))?;
    caps[1]
        .parse::<u16>()
        .map_err(|_| FtpError::protocol("EPSV port out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pasv_parse() {
        let addr =
            parse_pasv_response("227 Entering Passive Mode (192,168,1,10,195,149)").unwrap();
        assert_eq!(addr.ip().to_string(), "192.168.1.10");
        assert_eq!(addr.port(), 195 * 256 + 149);
    }

    #[test]
    fn pasv_parse_rejects_garbage() {
        assert!(parse_pasv_response("227 whatever").is_err());
        assert!(parse_pasv_response("227 (500,1,1,1,1,1)").is_err());
    }

    #[test]
    fn epsv_parse() {
        assert_eq!(
            parse_epsv_response("229 Entering Extended Passive Mode (|||50213|)").unwrap(),
            50213
        );
        assert!(parse_epsv_response("229 nope").is_err());
    }
}
