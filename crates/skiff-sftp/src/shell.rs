// ── Interactive shell channel ────────────────────────────────────────────────

use crate::error::{SftpError, SftpResult};
use crate::session::SftpSession;
use std::io::{Read, Write};

/// An interactive PTY-backed shell on the remote host.
///
/// The session stays usable for metadata and transfers while a shell is
/// open; the channel multiplexes over the same transport.
pub struct ShellChannel {
    channel: ssh2::Channel,
}

impl SftpSession {
    pub fn spawn_shell(&self, rows: u32, cols: u32) -> SftpResult<ShellChannel> {
        let mut channel = self
            .session
            .channel_session()
            .map_err(SftpError::from)?;
        channel
            .request_pty("xterm-256color", None, Some((cols, rows, 0, 0)))
            .map_err(SftpError::from)?;
        channel.shell().map_err(SftpError::from)?;
        Ok(ShellChannel { channel })
    }
}

impl ShellChannel {
    pub fn write(&mut self, data: &[u8]) -> SftpResult<()> {
        self.channel.write_all(data)?;
        self.channel.flush()?;
        Ok(())
    }

    pub fn read(&mut self, buf: &mut [u8]) -> SftpResult<usize> {
        Ok(self.channel.read(buf)?)
    }

    pub fn resize(&mut self, rows: u32, cols: u32) -> SftpResult<()> {
        self.channel
            .request_pty_size(cols, rows, None, None)
            .map_err(SftpError::from)
    }

    pub fn eof(&self) -> bool {
        self.channel.eof()
    }

    pub fn close(&mut self) -> SftpResult<()> {
        self.channel.close().map_err(SftpError::from)?;
        self.channel.wait_close().map_err(SftpError::from)
    }
}
