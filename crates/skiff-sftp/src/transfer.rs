// ── Bulk transfers – dedicated channel per transfer, resumable ───────────────

use crate::error::{SftpError, SftpResult};
use crate::session::SftpSession;
use log::debug;
use skiff_core::{paths, CancelToken, ProgressFn};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

const CHUNK_SIZE: usize = 128 * 1024;

impl SftpSession {
    /// Download `remote` into `local_path`, starting at byte `offset`.
    ///
    /// A nonzero offset opens the local file in append mode and seeks the
    /// remote read stream, so the bytes written continue the same file.
    pub fn download(
        &self,
        remote: &str,
        local_path: &str,
        offset: u64,
        progress: &ProgressFn,
        cancel: &CancelToken,
    ) -> SftpResult<u64> {
        let sftp = self.transfer_channel()?;
        let mut remote_file = sftp.open(Path::new(remote)).map_err(SftpError::from)?;
        let total = remote_file
            .stat()
            .map_err(SftpError::from)?
            .size
            .unwrap_or(0);

        if offset > 0 {
            remote_file.seek(SeekFrom::Start(offset))?;
        }

        let mut local_file = if offset > 0 {
            std::fs::OpenOptions::new()
                .append(true)
                .open(local_path)?
        } else {
            if let Some(parent) = Path::new(local_path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::File::create(local_path)?
        };

        debug!("sftp: download {} -> {} (offset {})", remote, local_path, offset);

        let mut transferred = offset;
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            if cancel.is_cancelled() {
                return Err(SftpError::cancelled());
            }
            let n = remote_file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            local_file.write_all(&buf[..n])?;
            transferred += n as u64;
            progress(transferred, n as u64, total);
        }
        local_file.flush()?;
        Ok(transferred - offset)
    }

    /// Upload `local_path` to `remote`, starting at byte `offset`.
    ///
    /// A nonzero offset seeks the local file and opens the remote one in
    /// append mode; otherwise the destination is truncated.
    pub fn upload(
        &self,
        local_path: &str,
        remote: &str,
        offset: u64,
        progress: &ProgressFn,
        cancel: &CancelToken,
    ) -> SftpResult<u64> {
        let total = std::fs::metadata(local_path)?.len();
        let mut local_file = std::fs::File::open(local_path)?;
        if offset > 0 {
            local_file.seek(SeekFrom::Start(offset))?;
        }

        let sftp = self.transfer_channel()?;
        let flags = if offset > 0 {
            ssh2::OpenFlags::WRITE | ssh2::OpenFlags::APPEND
        } else {
            ssh2::OpenFlags::WRITE | ssh2::OpenFlags::CREATE | ssh2::OpenFlags::TRUNCATE
        };
        let mut remote_file = sftp
            .open_mode(Path::new(remote), flags, 0o644, ssh2::OpenType::File)
            .map_err(SftpError::from)?;

        debug!("sftp: upload {} -> {} (offset {})", local_path, remote, offset);

        let mut transferred = offset;
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            if cancel.is_cancelled() {
                return Err(SftpError::cancelled());
            }
            let n = local_file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            remote_file.write_all(&buf[..n])?;
            transferred += n as u64;
            progress(transferred, n as u64, total);
        }
        Ok(transferred - offset)
    }

    /// Download a file or directory tree rooted at `remote`.
    pub fn download_path(
        &self,
        remote: &str,
        local_path: &str,
        progress: &ProgressFn,
        cancel: &CancelToken,
    ) -> SftpResult<()> {
        if self.stat(remote)?.is_dir() {
            std::fs::create_dir_all(local_path)?;
            for entry in self.list(remote)? {
                if cancel.is_cancelled() {
                    return Err(SftpError::cancelled());
                }
                let child_remote = paths::join(remote, &entry.name);
                let child_local = Path::new(local_path).join(&entry.name);
                self.download_path(
                    &child_remote,
                    &child_local.to_string_lossy(),
                    progress,
                    cancel,
                )?;
            }
            Ok(())
        } else {
            self.download(remote, local_path, 0, progress, cancel)?;
            Ok(())
        }
    }

    /// Upload a file or directory tree rooted at `local_path`.
    pub fn upload_path(
        &self,
        local_path: &str,
        remote: &str,
        progress: &ProgressFn,
        cancel: &CancelToken,
    ) -> SftpResult<()> {
        let meta = std::fs::metadata(local_path)?;
        if meta.is_dir() {
            self.mkdir(remote)?;
            let mut entries: Vec<_> =
                std::fs::read_dir(local_path)?.collect::<Result<_, _>>()?;
            entries.sort_by_key(|e| e.file_name());
            for entry in entries {
                if cancel.is_cancelled() {
                    return Err(SftpError::cancelled());
                }
                let name = entry.file_name().to_string_lossy().to_string();
                let child_remote = paths::join(remote, &name);
                self.upload_path(
                    &entry.path().to_string_lossy(),
                    &child_remote,
                    progress,
                    cancel,
                )?;
            }
            Ok(())
        } else {
            self.upload(local_path, remote, 0, progress, cancel)?;
            Ok(())
        }
    }
}
