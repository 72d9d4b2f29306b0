// ── Types ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ── Serde default helpers ────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}

// ── Protocols & profiles ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Sftp,
    Ftp,
    Ftps,
    S3,
}

impl Protocol {
    pub fn default_port(self) -> u16 {
        match self {
            Protocol::Sftp => 22,
            Protocol::Ftp | Protocol::Ftps => 21,
            Protocol::S3 => 443,
        }
    }

    pub fn is_cloud(self) -> bool {
        matches!(self, Protocol::S3)
    }
}

/// A saved connection profile.
///
/// Secret fields (`password`, `passphrase`, `secret_access_key`) hold either
/// plaintext or the `iv:tag:ciphertext` blob produced by the crypto store;
/// the profile store translates between the two on load/save.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub protocol: Protocol,
    #[serde(default)]
    pub host: String,
    /// 0 means "protocol default" (22 for sftp, 21 for ftp/ftps).
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub private_key_path: Option<String>,
    #[serde(default)]
    pub passphrase: Option<String>,
    #[serde(default)]
    pub use_agent: bool,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub folder: Option<String>,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub initial_path: Option<String>,
}

impl Profile {
    pub fn new(name: impl Into<String>, protocol: Protocol) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            protocol,
            host: String::new(),
            port: 0,
            username: String::new(),
            password: None,
            private_key_path: None,
            passphrase: None,
            use_agent: false,
            access_key_id: None,
            secret_access_key: None,
            region: None,
            bucket: None,
            endpoint: None,
            folder: None,
            favorite: false,
            initial_path: None,
        }
    }

    pub fn effective_port(&self) -> u16 {
        if self.port == 0 {
            self.protocol.default_port()
        } else {
            self.port
        }
    }

    /// Validate the profile invariants before it is saved or used to connect.
    pub fn validate(&self) -> Result<(), String> {
        if self.protocol.is_cloud() {
            if self.bucket.as_deref().unwrap_or("").is_empty() {
                return Err("Bucket must not be empty for cloud profiles".into());
            }
            if self.access_key_id.as_deref().unwrap_or("").is_empty() {
                return Err("Access key id must not be empty".into());
            }
        } else {
            if self.host.is_empty() {
                return Err("Host must not be empty".into());
            }
            let has_auth = self.use_agent
                || self.password.is_some()
                || self.private_key_path.is_some();
            if !has_auth {
                return Err("Profile needs a password, private key or agent auth".into());
            }
        }
        Ok(())
    }
}

// ── Settings ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    System,
    Dark,
    Light,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub theme: Theme,
    #[serde(default)]
    pub show_hidden: bool,
    #[serde(default)]
    pub default_local_path: String,
    #[serde(default = "default_true")]
    pub confirm_on_delete: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: Theme::System,
            show_hidden: false,
            default_local_path: String::new(),
            confirm_on_delete: true,
        }
    }
}

// ── Remote filesystem ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    pub name: String,
    pub is_dir: bool,
    /// Bytes; 0 for directories.
    pub size: u64,
    /// Seconds since epoch (UTC), when the backend reports one.
    pub modified: Option<u64>,
}

/// Directory bit used in `RemoteStat::mode` (matches SFTP S_IFDIR).
pub const MODE_DIR: u32 = 0o040000;
/// Regular-file bit (S_IFREG).
pub const MODE_FILE: u32 = 0o100000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStat {
    pub size: u64,
    /// Seconds since epoch.
    pub mtime: u64,
    pub mode: u32,
}

impl RemoteStat {
    pub fn file(size: u64, mtime: u64) -> Self {
        Self { size, mtime, mode: MODE_FILE | 0o644 }
    }

    pub fn dir(mtime: u64) -> Self {
        Self { size: 0, mtime, mode: MODE_DIR | 0o755 }
    }

    pub fn is_dir(&self) -> bool {
        self.mode & MODE_DIR != 0
    }
}

// ── Transfers ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TransferDirection {
    Upload,
    Download,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TransferStatus {
    Pending,
    Active,
    Completed,
    Failed,
    Cancelled,
    Interrupted,
}

impl TransferStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransferStatus::Completed | TransferStatus::Failed | TransferStatus::Cancelled
        )
    }
}

/// One queued transfer. Persisted to `transfers.json` after every meaningful
/// state change; everything in here must survive a process restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferTask {
    pub id: String,
    pub direction: TransferDirection,
    pub local_path: String,
    pub remote_path: String,
    /// Display name (basename of the source).
    pub name: String,
    /// Total bytes; 0 while unknown.
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub transferred: u64,
    /// Bytes/second over a ≥500 ms window. Not meaningful at rest.
    #[serde(default)]
    pub speed: f64,
    /// Derived percentage, 0–100.
    #[serde(default)]
    pub progress: f64,
    pub status: TransferStatus,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub error: Option<String>,
}

impl TransferTask {
    pub fn new(
        direction: TransferDirection,
        local_path: impl Into<String>,
        remote_path: impl Into<String>,
        name: impl Into<String>,
        total: u64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            direction,
            local_path: local_path.into(),
            remote_path: remote_path.into(),
            name: name.into(),
            total,
            transferred: 0,
            speed: 0.0,
            progress: 0.0,
            status: TransferStatus::Pending,
            retries: 0,
            error: None,
        }
    }
}

/// Progress callback: `(total_transferred, chunk, total_size)`.
///
/// `total_transferred` is cumulative for the current attempt. A backend that
/// restarts from zero (S3 uploads with a resume offset) simply reports the
/// rebased cumulative count; consumers tolerate one non-monotonic reset.
pub type ProgressFn = Arc<dyn Fn(u64, u64, u64) + Send + Sync>;

/// A progress callback that drops everything on the floor.
pub fn no_progress() -> ProgressFn {
    Arc::new(|_, _, _| {})
}

// ── Sync / compare ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SyncStatus {
    OnlyLocal,
    OnlyRemote,
    NewerLocal,
    NewerRemote,
    Same,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDiff {
    pub name: String,
    pub local_path: String,
    pub remote_path: String,
    pub status: SyncStatus,
    #[serde(default)]
    pub local_size: Option<u64>,
    #[serde(default)]
    pub remote_size: Option<u64>,
    #[serde(default)]
    pub local_mtime: Option<u64>,
    #[serde(default)]
    pub remote_mtime: Option<u64>,
}
