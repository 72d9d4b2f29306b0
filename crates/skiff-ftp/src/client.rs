//! Stateful FTP client — owns one control connection.
//!
//! Lifecycle: `connect()` → optional `AUTH TLS` upgrade → login → `FEAT`
//! probe → `TYPE I`. All paths passed in are absolute, so the client never
//! depends on the server-side working directory.
//!
//! The engine keeps one client per connection for metadata and creates a
//! fresh one for every bulk transfer (see the dispatcher); data channels
//! are negotiated per operation.

use crate::codec::FtpCodec;
use crate::data::{self, DataStream};
use crate::error::{FtpError, FtpErrorKind, FtpResult};
use crate::parser;
use crate::tls;
use crate::types::{FtpConfig, FtpSecurityMode, ServerFeatures};
use log::{debug, info};
use skiff_core::types::{DirectoryEntry, RemoteStat};
use skiff_core::{paths, CancelToken, ProgressFn};
use std::io::{Read, Seek, SeekFrom, Write};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

const CHUNK_SIZE: usize = 64 * 1024;

pub struct FtpClient {
    codec: FtpCodec,
    config: FtpConfig,
    pub features: ServerFeatures,
}

impl FtpClient {
    /// Establish and authenticate a session.
    pub async fn connect(config: FtpConfig) -> FtpResult<Self> {
        if config.host.is_empty() {
            return Err(FtpError::connection_failed("Host must not be empty"));
        }
        let addr = format!("{}:{}", config.host, config.port);
        let dur = Duration::from_secs(config.connect_timeout_secs);

        let tcp = timeout(dur, TcpStream::connect(&addr))
            .await
            .map_err(|_| FtpError::timeout(format!("TCP connect to {} timed out", addr)))?
            .map_err(|e| FtpError::connection_failed(format!("TCP connect to {}: {}", addr, e)))?;
        tcp.set_nodelay(true).ok();

        let mut codec = FtpCodec::from_tcp(tcp);
        let banner = codec.read_response().await?;
        if !banner.is_success() {
            return Err(FtpError::from_reply(banner.code, &banner.text()));
        }

        // ── Explicit FTPS: AUTH TLS ──────────────────────────────
        if config.security == FtpSecurityMode::Explicit {
            let resp = codec.execute("AUTH TLS").await?;
            if !resp.is_success() {
                return Err(FtpError::tls_failed(format!(
                    "AUTH TLS rejected: {}",
                    resp.text()
                )));
            }
            codec = tls::upgrade_to_tls(codec, &config.host, config.accept_invalid_certs).await?;
            codec.expect_ok("PBSZ 0").await?;
            codec.expect_ok("PROT P").await?;
        }

        // ── Login ────────────────────────────────────────────────
        let user_resp = codec.execute(&format!("USER {}", config.username)).await?;
        if user_resp.is_intermediate() {
            let pass_resp = codec.execute(&format!("PASS {}", config.password)).await?;
            if !pass_resp.is_success() {
                return Err(FtpError::auth_failed(format!(
                    "Login failed: {}",
                    pass_resp.text()
                )));
            }
        } else if !user_resp.is_success() {
            return Err(FtpError::auth_failed(format!(
                "USER rejected: {}",
                user_resp.text()
            )));
        }
        info!("ftp: authenticated to {} as {}", addr, config.username);

        // ── FEAT / UTF8 / TYPE ───────────────────────────────────
        let features = match codec.execute("FEAT").await {
            Ok(resp) if resp.is_success() => ServerFeatures::from_feat_lines(&resp.lines),
            _ => ServerFeatures::default(),
        };
        if features.utf8 {
            let _ = codec.execute("OPTS UTF8 ON").await;
        }
        codec.expect_ok("TYPE I").await?;

        Ok(Self { codec, config, features })
    }

    /// Keep the control connection alive.
    pub async fn noop(&mut self) -> FtpResult<()> {
        self.codec.expect_ok("NOOP").await?;
        Ok(())
    }

    /// Gracefully close the session.
    pub async fn quit(&mut self) {
        let _ = self.codec.execute("QUIT").await;
    }

    // ─── Listing & stat ──────────────────────────────────────────

    pub async fn list(&mut self, path: &str) -> FtpResult<Vec<DirectoryEntry>> {
        let cmd = if self.features.mlsd {
            format!("MLSD {}", path)
        } else {
            format!("LIST {}", path)
        };
        let body = self.retrieve_text(&cmd).await?;
        Ok(parser::parse_listing(&body))
    }

    /// Synthesise a stat by scanning the parent listing; modification time
    /// comes from the listing, refined by `MDTM` when the server offers it.
    pub async fn stat(&mut self, path: &str) -> FtpResult<RemoteStat> {
        let normalized = paths::normalize(path);
        if normalized == "/" {
            return Ok(RemoteStat::dir(0));
        }
        let name = paths::file_name(&normalized);
        let entries = self.list(&paths::parent(&normalized)).await?;
        let entry = entries
            .into_iter()
            .find(|e| e.name == name)
            .ok_or_else(|| FtpError::not_found(format!("'{}' not found", normalized)))?;

        let mut mtime = entry.modified.unwrap_or(0);
        if !entry.is_dir && self.features.mdtm {
            if let Ok(resp) = self.codec.expect_ok(&format!("MDTM {}", normalized)).await {
                if let Some(raw) = resp.text().split_whitespace().nth(1) {
                    if let Some(ts) = parser::parse_mdtm_timestamp(raw) {
                        mtime = ts;
                    }
                }
            }
        }

        Ok(if entry.is_dir {
            RemoteStat::dir(mtime)
        } else {
            RemoteStat::file(entry.size, mtime)
        })
    }

    /// RFC 3659 `SIZE`; 0 when the server does not support it.
    pub async fn size(&mut self, path: &str) -> FtpResult<u64> {
        if !self.features.size {
            return Ok(0);
        }
        let resp = self.codec.expect_ok(&format!("SIZE {}", path)).await?;
        resp.text()
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| FtpError::protocol(format!("Cannot parse SIZE: {}", resp.text())))
    }

    // ─── Transfers ───────────────────────────────────────────────

    /// Download `remote` into `local_path` starting at `offset` (server-side
    /// `REST`, local append).
    pub async fn download(
        &mut self,
        remote: &str,
        local_path: &str,
        offset: u64,
        progress: &ProgressFn,
        cancel: &CancelToken,
    ) -> FtpResult<u64> {
        let total = self.size(remote).await.unwrap_or(0);

        let mut local_file = if offset > 0 {
            std::fs::OpenOptions::new().append(true).open(local_path)?
        } else {
            if let Some(parent) = std::path::Path::new(local_path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::File::create(local_path)?
        };

        let mut data = self.open_data().await?;
        if offset > 0 {
            self.codec.expect(&format!("REST {}", offset), 3).await?;
        }
        self.start_transfer(&format!("RETR {}", remote)).await?;
        debug!("ftp: RETR {} (offset {})", remote, offset);

        let mut transferred = offset;
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            if cancel.is_cancelled() {
                return Err(FtpError::cancelled());
            }
            let n = data.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            local_file.write_all(&buf[..n])?;
            transferred += n as u64;
            progress(transferred, n as u64, total);
        }
        local_file.flush()?;
        drop(data);

        self.finish_transfer().await?;
        Ok(transferred - offset)
    }

    /// Upload `local_path` to `remote`. A nonzero offset switches to append
    /// semantics (`APPE`); otherwise a plain `STOR` replaces the file.
    pub async fn upload(
        &mut self,
        local_path: &str,
        remote: &str,
        offset: u64,
        progress: &ProgressFn,
        cancel: &CancelToken,
    ) -> FtpResult<u64> {
        let total = std::fs::metadata(local_path)?.len();
        let mut local_file = std::fs::File::open(local_path)?;
        if offset > 0 {
            local_file.seek(SeekFrom::Start(offset))?;
        }

        let mut data = self.open_data().await?;
        let cmd = if offset > 0 {
            format!("APPE {}", remote)
        } else {
            format!("STOR {}", remote)
        };
        self.start_transfer(&cmd).await?;
        debug!("ftp: {} (offset {})", cmd, offset);

        let mut transferred = offset;
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            if cancel.is_cancelled() {
                return Err(FtpError::cancelled());
            }
            let n = local_file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            data.write_all(&buf[..n]).await?;
            transferred += n as u64;
            progress(transferred, n as u64, total);
        }
        data.shutdown().await?;
        drop(data);

        self.finish_transfer().await?;
        Ok(transferred - offset)
    }

    /// Whole-file read into memory, capped at `max_bytes`.
    pub async fn retr_bytes(&mut self, remote: &str, max_bytes: u64) -> FtpResult<Vec<u8>> {
        let mut data = self.open_data().await?;
        self.start_transfer(&format!("RETR {}", remote)).await?;

        let mut out = Vec::new();
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = data.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
            if out.len() as u64 > max_bytes {
                return Err(FtpError::transfer_failed(format!(
                    "File exceeds the {} byte cap",
                    max_bytes
                )));
            }
        }
        drop(data);
        self.finish_transfer().await?;
        Ok(out)
    }

    /// Whole-file write from memory.
    pub async fn stor_bytes(&mut self, remote: &str, bytes: &[u8]) -> FtpResult<()> {
        let mut data = self.open_data().await?;
        self.start_transfer(&format!("STOR {}", remote)).await?;
        data.write_all(bytes).await?;
        data.shutdown().await?;
        drop(data);
        self.finish_transfer().await?;
        Ok(())
    }

    // ─── Directory & file management ─────────────────────────────

    /// Create a directory, succeeding if it already exists.
    pub async fn ensure_dir(&mut self, path: &str) -> FtpResult<()> {
        match self.codec.expect_ok(&format!("MKD {}", path)).await {
            Ok(_) => Ok(()),
            Err(e) => {
                // MKD on an existing directory is a 550 on most servers;
                // a successful CWD proves it is there. Absolute paths keep
                // the session usable regardless of the working directory.
                match self.codec.expect_ok(&format!("CWD {}", path)).await {
                    Ok(_) => Ok(()),
                    Err(_) => Err(e),
                }
            }
        }
    }

    pub async fn delete_file(&mut self, path: &str) -> FtpResult<()> {
        self.codec.expect_ok(&format!("DELE {}", path)).await?;
        Ok(())
    }

    pub async fn remove_dir_all(&mut self, path: &str) -> FtpResult<()> {
        let entries = self.list(path).await?;
        for entry in entries {
            let child = paths::join(path, &entry.name);
            if entry.is_dir {
                Box::pin(self.remove_dir_all(&child)).await?;
            } else {
                self.delete_file(&child).await?;
            }
        }
        self.codec.expect_ok(&format!("RMD {}", path)).await?;
        Ok(())
    }

    pub async fn rename(&mut self, from: &str, to: &str) -> FtpResult<()> {
        self.codec.expect(&format!("RNFR {}", from), 3).await?;
        self.codec.expect_ok(&format!("RNTO {}", to)).await?;
        Ok(())
    }

    // ─── Recursive transfers ─────────────────────────────────────

    pub async fn download_path(
        &mut self,
        remote: &str,
        local_path: &str,
        progress: &ProgressFn,
        cancel: &CancelToken,
    ) -> FtpResult<()> {
        if self.stat(remote).await?.is_dir() {
            std::fs::create_dir_all(local_path)?;
            for entry in self.list(remote).await? {
                if cancel.is_cancelled() {
                    return Err(FtpError::cancelled());
                }
                let child_remote = paths::join(remote, &entry.name);
                let child_local = std::path::Path::new(local_path).join(&entry.name);
                Box::pin(self.download_path(
                    &child_remote,
                    &child_local.to_string_lossy(),
                    progress,
                    cancel,
                ))
                .await?;
            }
            Ok(())
        } else {
            self.download(remote, local_path, 0, progress, cancel).await?;
            Ok(())
        }
    }

    pub async fn upload_path(
        &mut self,
        local_path: &str,
        remote: &str,
        progress: &ProgressFn,
        cancel: &CancelToken,
    ) -> FtpResult<()> {
        let meta = std::fs::metadata(local_path)?;
        if meta.is_dir() {
            self.ensure_dir(remote).await?;
            let mut entries: Vec<_> =
                std::fs::read_dir(local_path)?.collect::<Result<_, _>>()?;
            entries.sort_by_key(|e| e.file_name());
            for entry in entries {
                if cancel.is_cancelled() {
                    return Err(FtpError::cancelled());
                }
                let name = entry.file_name().to_string_lossy().to_string();
                Box::pin(self.upload_path(
                    &entry.path().to_string_lossy(),
                    &paths::join(remote, &name),
                    progress,
                    cancel,
                ))
                .await?;
            }
            Ok(())
        } else {
            self.upload(local_path, remote, 0, progress, cancel).await?;
            Ok(())
        }
    }

    // ─── Internal helpers ────────────────────────────────────────

    async fn open_data(&mut self) -> FtpResult<DataStream> {
        data::open_data_channel(
            &mut self.codec,
            self.config.security,
            &self.config.host,
            self.config.accept_invalid_certs,
            Duration::from_secs(self.config.data_timeout_secs),
        )
        .await
    }

    /// Issue the transfer command; 1xx or 2xx means the data flows.
    async fn start_transfer(&mut self, cmd: &str) -> FtpResult<()> {
        let resp = self.codec.execute(cmd).await?;
        if !resp.is_preliminary() && !resp.is_success() {
            return Err(FtpError::from_reply(resp.code, &resp.text()));
        }
        Ok(())
    }

    /// Consume the 226 completion reply after the data channel closed.
    async fn finish_transfer(&mut self) -> FtpResult<()> {
        let done = self.codec.read_response().await?;
        if !done.is_success() {
            return Err(FtpError::from_reply(done.code, &done.text()));
        }
        Ok(())
    }

    /// Open a data channel, run `cmd`, and collect the body as text.
    async fn retrieve_text(&mut self, cmd: &str) -> FtpResult<String> {
        let mut data = self.open_data().await?;
        self.start_transfer(cmd).await?;

        let mut buf = Vec::new();
        data.read_to_end(&mut buf).await?;
        drop(data);

        self.finish_transfer().await?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

impl std::fmt::Debug for FtpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FtpClient")
            .field("host", &self.config.host)
            .field("security", &self.config.security)
            .finish()
    }
}

impl FtpError {
    /// True when retrying on a fresh connection could help.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            FtpErrorKind::Disconnected
                | FtpErrorKind::Timeout
                | FtpErrorKind::DataChannelFailed
                | FtpErrorKind::TransferFailed
        )
    }
}
