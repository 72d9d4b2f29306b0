//! Control-channel command/response codec (RFC 959 §4).
//!
//! Sends CRLF-terminated commands and reads single- or multi-line replies,
//! over either a plain TCP stream or its TLS-wrapped upgrade.

use crate::error::{FtpError, FtpResult};
use crate::types::FtpResponse;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadBuf};
use tokio::net::TcpStream;
use tokio_native_tls::TlsStream;

/// The control connection, before or after the TLS upgrade.
pub enum ControlStream {
    Plain(TcpStream),
    Tls(TlsStream<TcpStream>),
}

impl AsyncRead for ControlStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            ControlStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            ControlStream::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ControlStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            ControlStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            ControlStream::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            ControlStream::Plain(s) => Pin::new(s).poll_flush(cx),
            ControlStream::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            ControlStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            ControlStream::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// Command/response driver over the control connection.
pub struct FtpCodec {
    stream: BufReader<ControlStream>,
}

impl FtpCodec {
    pub fn from_tcp(stream: TcpStream) -> Self {
        Self { stream: BufReader::new(ControlStream::Plain(stream)) }
    }

    pub fn from_tls(stream: TlsStream<TcpStream>) -> Self {
        Self { stream: BufReader::new(ControlStream::Tls(stream)) }
    }

    /// Surrender the underlying stream (for the `AUTH TLS` upgrade).
    pub fn into_inner(self) -> ControlStream {
        self.stream.into_inner()
    }

    /// Send a raw command; the CRLF terminator is appended here.
    pub async fn send_command(&mut self, cmd: &str) -> FtpResult<()> {
        let line = format!("{}\r\n", cmd);
        self.stream.get_mut().write_all(line.as_bytes()).await?;
        self.stream.get_mut().flush().await?;
        if cmd.starts_with("PASS") {
            log::trace!(">>> PASS ****");
        } else {
            log::trace!(">>> {}", cmd);
        }
        Ok(())
    }

    async fn read_line_raw(&mut self) -> FtpResult<String> {
        let mut buf = String::new();
        let n = self.stream.read_line(&mut buf).await?;
        if n == 0 {
            return Err(FtpError::disconnected("Server closed connection"));
        }
        Ok(buf)
    }

    /// Read a complete reply, following `NNN-…` multi-line continuations
    /// until the matching `NNN ` terminator line.
    pub async fn read_response(&mut self) -> FtpResult<FtpResponse> {
        let first = self.read_line_raw().await?;
        let first = first.trim_end_matches(['\r', '\n']);
        let code = parse_code(first)?;
        let mut lines = vec![first.to_string()];

        let is_multi = first.len() >= 4 && first.as_bytes()[3] == b'-';
        if is_multi {
            let terminator = format!("{} ", code);
            loop {
                let next = self.read_line_raw().await?;
                let next = next.trim_end_matches(['\r', '\n']);
                lines.push(next.to_string());
                if next.starts_with(&terminator) {
                    break;
                }
            }
        }

        let resp = FtpResponse { code, lines };
        log::trace!("<<< {} {}", resp.code, resp.lines.last().map(String::as_str).unwrap_or(""));
        Ok(resp)
    }

    /// Send a command and read its reply.
    pub async fn execute(&mut self, cmd: &str) -> FtpResult<FtpResponse> {
        self.send_command(cmd).await?;
        self.read_response().await
    }

    /// Send a command, requiring a reply in the given class (2 for 2xx…).
    pub async fn expect(&mut self, cmd: &str, class: u16) -> FtpResult<FtpResponse> {
        let resp = self.execute(cmd).await?;
        if resp.code / 100 != class {
            return Err(FtpError::from_reply(resp.code, &resp.text()));
        }
        Ok(resp)
    }

    /// Send a command, requiring a 2xx reply.
    pub async fn expect_ok(&mut self, cmd: &str) -> FtpResult<FtpResponse> {
        self.expect(cmd, 2).await
    }
}

/// Parse the 3-digit reply code from the start of a line.
fn parse_code(line: &str) -> FtpResult<u16> {
    if line.len() < 3 {
        return Err(FtpError::protocol(format!("Reply too short: '{}'", line)));
    }
    line[..3]
        .parse::<u16>()
        .map_err(|_| FtpError::protocol(format!("Invalid reply code in: '{}'", line)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_parsing() {
        assert_eq!(parse_code("220 Welcome").unwrap(), 220);
        assert_eq!(parse_code("550-No").unwrap(), 550);
        assert!(parse_code("hi").is_err());
        assert!(parse_code("xyz nope").is_err());
    }
}
