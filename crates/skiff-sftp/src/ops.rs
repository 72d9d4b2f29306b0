// ── Metadata & small-file operations (shared channel) ────────────────────────

use crate::error::{SftpError, SftpErrorKind, SftpResult};
use crate::session::SftpSession;
use base64::Engine;
use skiff_core::types::{DirectoryEntry, RemoteStat, MODE_DIR, MODE_FILE};
use std::io::{Read, Write};
use std::path::Path;

impl SftpSession {
    pub fn list(&self, path: &str) -> SftpResult<Vec<DirectoryEntry>> {
        let entries = self.meta.readdir(Path::new(path)).map_err(SftpError::from)?;
        Ok(entries
            .iter()
            .filter_map(|(p, stat)| {
                let name = p.file_name()?.to_string_lossy().to_string();
                Some(DirectoryEntry {
                    name,
                    is_dir: stat.is_dir(),
                    size: if stat.is_dir() { 0 } else { stat.size.unwrap_or(0) },
                    modified: stat.mtime,
                })
            })
            .collect())
    }

    pub fn stat(&self, path: &str) -> SftpResult<RemoteStat> {
        let stat = self.meta.stat(Path::new(path)).map_err(SftpError::from)?;
        let type_bits = if stat.is_dir() { MODE_DIR } else { MODE_FILE };
        Ok(RemoteStat {
            size: stat.size.unwrap_or(0),
            mtime: stat.mtime.unwrap_or(0),
            mode: type_bits | (stat.perm.unwrap_or(0o644) & 0o7777),
        })
    }

    pub fn read_file(&self, path: &str) -> SftpResult<String> {
        let bytes = self.read_bytes(path, u64::MAX)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Binary whole-file read, capped at `max_bytes`.
    pub fn read_bytes(&self, path: &str, max_bytes: u64) -> SftpResult<Vec<u8>> {
        let mut file = self.meta.open(Path::new(path)).map_err(SftpError::from)?;
        let size = file.stat().map_err(SftpError::from)?.size.unwrap_or(0);
        if size > max_bytes {
            return Err(SftpError::io(format!(
                "File is {} bytes, larger than the {} byte cap",
                size, max_bytes
            )));
        }
        let mut buf = Vec::with_capacity(size as usize);
        file.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Base64-shaped binary read for IPC surfaces.
    pub fn read_buffer(&self, path: &str, max_bytes: u64) -> SftpResult<String> {
        let bytes = self.read_bytes(path, max_bytes)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn write_file(&self, path: &str, content: &str) -> SftpResult<()> {
        let mut file = self
            .meta
            .create(Path::new(path))
            .map_err(SftpError::from)?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }

    /// Create a directory, succeeding if it already exists.
    pub fn mkdir(&self, path: &str) -> SftpResult<()> {
        match self.meta.mkdir(Path::new(path), 0o755) {
            Ok(()) => Ok(()),
            Err(e) => {
                // A second stat tells "already exists" apart from real failures.
                if self.meta.stat(Path::new(path)).is_ok() {
                    Ok(())
                } else {
                    Err(SftpError::from(e))
                }
            }
        }
    }

    pub fn remove_file(&self, path: &str) -> SftpResult<()> {
        self.meta.unlink(Path::new(path)).map_err(SftpError::from)
    }

    /// Remove a directory and everything below it, depth first.
    pub fn remove_dir_all(&self, path: &str) -> SftpResult<()> {
        for entry in self.list(path)? {
            let child = skiff_core::paths::join(path, &entry.name);
            if entry.is_dir {
                self.remove_dir_all(&child)?;
            } else {
                self.remove_file(&child)?;
            }
        }
        self.meta.rmdir(Path::new(path)).map_err(SftpError::from)
    }

    pub fn rename(&self, from: &str, to: &str) -> SftpResult<()> {
        self.meta
            .rename(Path::new(from), Path::new(to), None)
            .map_err(SftpError::from)
    }

    /// Run a command over a fresh exec channel, returning merged output.
    pub fn exec(&self, command: &str) -> SftpResult<String> {
        let mut channel = self
            .session
            .channel_session()
            .map_err(SftpError::from)?;
        channel.exec(command).map_err(SftpError::from)?;

        let mut output = String::new();
        channel.read_to_string(&mut output)?;
        let mut stderr = String::new();
        channel.stderr().read_to_string(&mut stderr)?;
        if !stderr.is_empty() {
            output.push_str(&stderr);
        }

        channel.wait_close().map_err(SftpError::from)?;
        let status = channel.exit_status().map_err(SftpError::from)?;
        if status != 0 && output.is_empty() {
            return Err(SftpError::new(
                SftpErrorKind::Unknown,
                format!("Command exited with status {}", status),
            ));
        }
        Ok(output)
    }
}
