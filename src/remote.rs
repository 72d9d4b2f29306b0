//! Remote dispatcher — one uniform surface over the active backend.
//!
//! Holds at most one connection at a time. Metadata calls share the
//! backend's control channel; every bulk transfer acquires its own
//! resource (SFTP channel, fresh FTP client, independent HTTPS request)
//! so a slow transfer never blocks a directory listing.
//!
//! All incoming remote paths are normalised here; backends see clean
//! absolute POSIX paths. Errors are normalised into `RemoteError` at this
//! boundary. Capabilities a backend lacks fail with `Unsupported`.

use crate::staging;
use async_trait::async_trait;
use base64::Engine;
use log::{info, warn};
use skiff_core::types::{DirectoryEntry, Profile, Protocol, RemoteStat};
use skiff_core::{paths, CancelToken, ProgressFn, RemoteError, RemoteResult};
use skiff_ftp::{FtpClient, FtpConfig, FtpSecurityMode};
use skiff_s3::{S3Client, S3Config};
use skiff_sftp::{SftpConfig, SftpSession, ShellChannel};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Narrow transfer contract consumed by the queue and the edit bridge.
#[async_trait]
pub trait TransferBackend: Send + Sync {
    async fn download(
        &self,
        remote: &str,
        local: &str,
        offset: u64,
        progress: ProgressFn,
        cancel: CancelToken,
    ) -> RemoteResult<()>;

    async fn upload(
        &self,
        local: &str,
        remote: &str,
        offset: u64,
        progress: ProgressFn,
        cancel: CancelToken,
    ) -> RemoteResult<()>;
}

enum Backend {
    Sftp(SftpSession),
    Ftp {
        config: FtpConfig,
        control: Mutex<FtpClient>,
    },
    S3(S3Client),
}

pub struct RemoteDispatcher {
    active: RwLock<Option<Arc<Backend>>>,
}

pub type RemoteDispatcherState = Arc<RemoteDispatcher>;

impl Default for RemoteDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteDispatcher {
    pub fn new() -> Self {
        Self { active: RwLock::new(None) }
    }

    // ─── Connection lifecycle ────────────────────────────────────

    /// Establish the single active connection; any prior one is closed first.
    pub async fn connect(&self, profile: &Profile) -> RemoteResult<()> {
        profile.validate().map_err(RemoteError::internal)?;
        self.disconnect().await;

        let backend = match profile.protocol {
            Protocol::Sftp => {
                let config = SftpConfig {
                    host: profile.host.clone(),
                    port: profile.effective_port(),
                    username: profile.username.clone(),
                    password: profile.password.clone(),
                    private_key_path: profile.private_key_path.clone(),
                    passphrase: profile.passphrase.clone(),
                    use_agent: profile.use_agent,
                    timeout_secs: 30,
                    keepalive_secs: 60,
                };
                let session = tokio::task::spawn_blocking(move || SftpSession::connect(&config))
                    .await
                    .map_err(|e| RemoteError::internal(e.to_string()))??;
                Backend::Sftp(session)
            }
            Protocol::Ftp | Protocol::Ftps => {
                let config = FtpConfig {
                    host: profile.host.clone(),
                    port: profile.effective_port(),
                    username: profile.username.clone(),
                    password: profile.password.clone().unwrap_or_default(),
                    security: if profile.protocol == Protocol::Ftps {
                        FtpSecurityMode::Explicit
                    } else {
                        FtpSecurityMode::None
                    },
                    accept_invalid_certs: true,
                    connect_timeout_secs: 30,
                    data_timeout_secs: 60,
                };
                let control = FtpClient::connect(config.clone()).await?;
                Backend::Ftp { config, control: Mutex::new(control) }
            }
            Protocol::S3 => {
                let config = S3Config {
                    access_key_id: profile.access_key_id.clone().unwrap_or_default(),
                    secret_access_key: profile.secret_access_key.clone().unwrap_or_default(),
                    region: profile
                        .region
                        .clone()
                        .unwrap_or_else(|| "us-east-1".to_string()),
                    bucket: profile.bucket.clone().unwrap_or_default(),
                    endpoint: profile.endpoint.clone(),
                };
                let client = S3Client::new(config);
                client.head_bucket().await.map_err(|e| {
                    if e.is_access_denied() {
                        RemoteError::bucket_denied(format!(
                            "Access to bucket '{}' denied: {}",
                            client.config.bucket, e
                        ))
                    } else {
                        RemoteError::from(e)
                    }
                })?;
                Backend::S3(client)
            }
        };

        *self.active.write().await = Some(Arc::new(backend));
        info!("remote: connected profile '{}' ({:?})", profile.name, profile.protocol);
        Ok(())
    }

    /// Idempotent teardown.
    pub async fn disconnect(&self) {
        let previous = self.active.write().await.take();
        if let Some(backend) = previous {
            match &*backend {
                Backend::Sftp(session) => session.disconnect(),
                Backend::Ftp { control, .. } => control.lock().await.quit().await,
                Backend::S3(_) => {}
            }
            info!("remote: disconnected");
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.active.read().await.is_some()
    }

    async fn backend(&self) -> RemoteResult<Arc<Backend>> {
        self.active
            .read()
            .await
            .clone()
            .ok_or_else(RemoteError::not_connected)
    }

    /// A fresh FTP client for one bulk transfer.
    async fn fresh_ftp(config: &FtpConfig) -> RemoteResult<FtpClient> {
        Ok(FtpClient::connect(config.clone()).await?)
    }

    // ─── Metadata ────────────────────────────────────────────────

    pub async fn list(&self, remote_path: &str) -> RemoteResult<Vec<DirectoryEntry>> {
        let path = paths::normalize(remote_path);
        match &*self.backend().await? {
            Backend::Sftp(session) => Ok(session.list(&path)?),
            Backend::Ftp { control, .. } => Ok(control.lock().await.list(&path).await?),
            Backend::S3(client) => Ok(client.list_dir(&path).await?),
        }
    }

    pub async fn stat(&self, remote_path: &str) -> RemoteResult<RemoteStat> {
        let path = paths::normalize(remote_path);
        match &*self.backend().await? {
            Backend::Sftp(session) => Ok(session.stat(&path)?),
            Backend::Ftp { control, .. } => Ok(control.lock().await.stat(&path).await?),
            Backend::S3(client) => Ok(client.stat_path(&path).await?),
        }
    }

    pub async fn mkdir(&self, remote_path: &str) -> RemoteResult<()> {
        let path = paths::normalize(remote_path);
        match &*self.backend().await? {
            Backend::Sftp(session) => Ok(session.mkdir(&path)?),
            Backend::Ftp { control, .. } => Ok(control.lock().await.ensure_dir(&path).await?),
            Backend::S3(client) => Ok(client.create_dir_marker(&path).await?),
        }
    }

    /// Remove a file or directory tree.
    pub async fn remove(&self, remote_path: &str) -> RemoteResult<()> {
        let path = paths::normalize(remote_path);
        match &*self.backend().await? {
            Backend::Sftp(session) => {
                if session.stat(&path)?.is_dir() {
                    Ok(session.remove_dir_all(&path)?)
                } else {
                    Ok(session.remove_file(&path)?)
                }
            }
            Backend::Ftp { control, .. } => {
                let mut client = control.lock().await;
                if client.stat(&path).await?.is_dir() {
                    Ok(client.remove_dir_all(&path).await?)
                } else {
                    Ok(client.delete_file(&path).await?)
                }
            }
            Backend::S3(client) => {
                if client.stat_path(&path).await?.is_dir() {
                    Ok(client.delete_prefix(&path).await?)
                } else {
                    Ok(client.delete_object(&path).await?)
                }
            }
        }
    }

    pub async fn rename(&self, from: &str, to: &str) -> RemoteResult<()> {
        let from = paths::normalize(from);
        let to = paths::normalize(to);
        match &*self.backend().await? {
            Backend::Sftp(session) => Ok(session.rename(&from, &to)?),
            Backend::Ftp { control, .. } => Ok(control.lock().await.rename(&from, &to).await?),
            Backend::S3(client) => {
                if client.stat_path(&from).await?.is_dir() {
                    Err(RemoteError::unsupported("rename of object-store directories"))
                } else {
                    Ok(client.rename_object(&from, &to).await?)
                }
            }
        }
    }

    // ─── Whole-object transfers (recursive) ──────────────────────

    pub async fn get(
        &self,
        remote_path: &str,
        local_path: &str,
        cancel: CancelToken,
    ) -> RemoteResult<()> {
        self.get_with_progress(
            remote_path,
            local_path,
            0,
            skiff_core::types::no_progress(),
            cancel,
        )
        .await
    }

    pub async fn put(
        &self,
        local_path: &str,
        remote_path: &str,
        cancel: CancelToken,
    ) -> RemoteResult<()> {
        self.put_with_progress(
            local_path,
            remote_path,
            0,
            skiff_core::types::no_progress(),
            cancel,
        )
        .await
    }

    // ─── Progress-reported single-file transfers (resumable) ─────

    /// Download with a progress callback and a resume offset. Directories
    /// recurse with per-file progress; the offset applies to single files.
    pub async fn get_with_progress(
        &self,
        remote_path: &str,
        local_path: &str,
        offset: u64,
        progress: ProgressFn,
        cancel: CancelToken,
    ) -> RemoteResult<()> {
        let remote = paths::normalize(remote_path);
        if offset == 0 {
            let is_dir = matches!(self.stat(&remote).await, Ok(stat) if stat.is_dir());
            if is_dir {
                return match &*self.backend().await? {
                    Backend::Sftp(session) => {
                        Ok(session.download_path(&remote, local_path, &progress, &cancel)?)
                    }
                    Backend::Ftp { config, .. } => {
                        let mut client = Self::fresh_ftp(config).await?;
                        let result = client
                            .download_path(&remote, local_path, &progress, &cancel)
                            .await;
                        client.quit().await;
                        Ok(result?)
                    }
                    Backend::S3(client) => {
                        self.s3_get_recursive(client, &remote, local_path, &progress, &cancel)
                            .await
                    }
                };
            }
        }
        match &*self.backend().await? {
            Backend::Sftp(session) => {
                session.download(&remote, local_path, offset, &progress, &cancel)?;
                Ok(())
            }
            Backend::Ftp { config, .. } => {
                let mut client = Self::fresh_ftp(config).await?;
                let result = client
                    .download(&remote, local_path, offset, &progress, &cancel)
                    .await;
                client.quit().await;
                result?;
                Ok(())
            }
            Backend::S3(client) => {
                client
                    .get_to_file(&remote, local_path, offset, &progress, &cancel)
                    .await?;
                Ok(())
            }
        }
    }

    /// Upload with a progress callback and a resume offset.
    ///
    /// S3 cannot append: a nonzero offset is ignored there and the upload
    /// restarts from zero, which the progress stream reflects so the queue
    /// can re-base its accounting.
    pub async fn put_with_progress(
        &self,
        local_path: &str,
        remote_path: &str,
        offset: u64,
        progress: ProgressFn,
        cancel: CancelToken,
    ) -> RemoteResult<()> {
        let remote = paths::normalize(remote_path);
        let local_is_dir = std::fs::metadata(local_path)
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if local_is_dir {
            return match &*self.backend().await? {
                Backend::Sftp(session) => {
                    Ok(session.upload_path(local_path, &remote, &progress, &cancel)?)
                }
                Backend::Ftp { config, .. } => {
                    let mut client = Self::fresh_ftp(config).await?;
                    let result = client
                        .upload_path(local_path, &remote, &progress, &cancel)
                        .await;
                    client.quit().await;
                    Ok(result?)
                }
                Backend::S3(client) => {
                    self.s3_put_recursive(client, local_path, &remote, &progress, &cancel)
                        .await
                }
            };
        }
        match &*self.backend().await? {
            Backend::Sftp(session) => {
                session.upload(local_path, &remote, offset, &progress, &cancel)?;
                Ok(())
            }
            Backend::Ftp { config, .. } => {
                let mut client = Self::fresh_ftp(config).await?;
                let result = client
                    .upload(local_path, &remote, offset, &progress, &cancel)
                    .await;
                client.quit().await;
                result?;
                Ok(())
            }
            Backend::S3(client) => {
                if offset > 0 {
                    warn!(
                        "remote: S3 upload of '{}' ignores resume offset {}, restarting",
                        remote, offset
                    );
                }
                client.put_file(local_path, &remote, &progress, &cancel).await?;
                Ok(())
            }
        }
    }

    // ─── Small-file utilities ────────────────────────────────────

    pub async fn read_file(&self, remote_path: &str) -> RemoteResult<String> {
        let path = paths::normalize(remote_path);
        match &*self.backend().await? {
            Backend::Sftp(session) => Ok(session.read_file(&path)?),
            Backend::Ftp { control, .. } => {
                let bytes = control.lock().await.retr_bytes(&path, u64::MAX).await?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
            Backend::S3(client) => {
                let bytes = client.get_bytes(&path, u64::MAX).await?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
        }
    }

    pub async fn write_file(&self, remote_path: &str, content: &str) -> RemoteResult<()> {
        let path = paths::normalize(remote_path);
        match &*self.backend().await? {
            Backend::Sftp(session) => Ok(session.write_file(&path, content)?),
            Backend::Ftp { control, .. } => {
                Ok(control.lock().await.stor_bytes(&path, content.as_bytes()).await?)
            }
            Backend::S3(client) => Ok(client.put_bytes(&path, content.as_bytes()).await?),
        }
    }

    /// Binary whole-file read, base64-shaped for IPC. `max_bytes` caps the
    /// raw size.
    pub async fn read_buffer(&self, remote_path: &str, max_bytes: u64) -> RemoteResult<String> {
        let path = paths::normalize(remote_path);
        let engine = base64::engine::general_purpose::STANDARD;
        match &*self.backend().await? {
            Backend::Sftp(session) => Ok(session.read_buffer(&path, max_bytes)?),
            Backend::Ftp { control, .. } => {
                let bytes = control.lock().await.retr_bytes(&path, max_bytes).await?;
                Ok(engine.encode(bytes))
            }
            Backend::S3(client) => {
                let bytes = client.get_bytes(&path, max_bytes).await?;
                Ok(engine.encode(bytes))
            }
        }
    }

    // ─── Shell-family capabilities ───────────────────────────────

    pub async fn exec_command(&self, command: &str) -> RemoteResult<String> {
        match &*self.backend().await? {
            Backend::Sftp(session) => Ok(session.exec(command)?),
            _ => Err(RemoteError::unsupported("execCommand")),
        }
    }

    pub async fn spawn_shell(&self, rows: u32, cols: u32) -> RemoteResult<ShellChannel> {
        match &*self.backend().await? {
            Backend::Sftp(session) => Ok(session.spawn_shell(rows, cols)?),
            _ => Err(RemoteError::unsupported("shell")),
        }
    }

    // ─── Drag staging ────────────────────────────────────────────

    /// Download into a freshly created per-invocation staging directory and
    /// return the local path. The directory is swept on the next startup.
    pub async fn start_drag(&self, remote_path: &str) -> RemoteResult<PathBuf> {
        let remote = paths::normalize(remote_path);
        let stage = staging::create_stage_dir().map_err(RemoteError::from)?;
        let local = stage.join(paths::file_name(&remote));
        self.get(&remote, &local.to_string_lossy(), CancelToken::new())
            .await?;
        Ok(local)
    }

    // ─── S3 recursion helpers ────────────────────────────────────

    async fn s3_get_recursive(
        &self,
        client: &S3Client,
        remote: &str,
        local_path: &str,
        progress: &ProgressFn,
        cancel: &CancelToken,
    ) -> RemoteResult<()> {
        if client.stat_path(remote).await?.is_dir() {
            std::fs::create_dir_all(local_path).map_err(RemoteError::from)?;
            for entry in client.list_dir(remote).await? {
                if cancel.is_cancelled() {
                    return Err(RemoteError::cancelled());
                }
                let child_remote = paths::join(remote, &entry.name);
                let child_local = std::path::Path::new(local_path).join(&entry.name);
                Box::pin(self.s3_get_recursive(
                    client,
                    &child_remote,
                    &child_local.to_string_lossy(),
                    progress,
                    cancel,
                ))
                .await?;
            }
            Ok(())
        } else {
            client
                .get_to_file(remote, local_path, 0, progress, cancel)
                .await?;
            Ok(())
        }
    }

    async fn s3_put_recursive(
        &self,
        client: &S3Client,
        local_path: &str,
        remote: &str,
        progress: &ProgressFn,
        cancel: &CancelToken,
    ) -> RemoteResult<()> {
        let meta = std::fs::metadata(local_path).map_err(RemoteError::from)?;
        if meta.is_dir() {
            let mut entries: Vec<_> = std::fs::read_dir(local_path)
                .map_err(RemoteError::from)?
                .collect::<Result<_, _>>()
                .map_err(RemoteError::from)?;
            entries.sort_by_key(|e| e.file_name());
            for entry in entries {
                if cancel.is_cancelled() {
                    return Err(RemoteError::cancelled());
                }
                let name = entry.file_name().to_string_lossy().to_string();
                Box::pin(self.s3_put_recursive(
                    client,
                    &entry.path().to_string_lossy(),
                    &paths::join(remote, &name),
                    progress,
                    cancel,
                ))
                .await?;
            }
            Ok(())
        } else {
            client.put_file(local_path, remote, progress, cancel).await?;
            Ok(())
        }
    }
}

#[async_trait]
impl TransferBackend for RemoteDispatcher {
    async fn download(
        &self,
        remote: &str,
        local: &str,
        offset: u64,
        progress: ProgressFn,
        cancel: CancelToken,
    ) -> RemoteResult<()> {
        self.get_with_progress(remote, local, offset, progress, cancel)
            .await
    }

    async fn upload(
        &self,
        local: &str,
        remote: &str,
        offset: u64,
        progress: ProgressFn,
        cancel: CancelToken,
    ) -> RemoteResult<()> {
        self.put_with_progress(local, remote, offset, progress, cancel)
            .await
    }
}
