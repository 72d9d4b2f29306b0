//! # skiff
//!
//! A multi-protocol file-transfer engine. One dispatcher fronts SFTP,
//! FTP/FTPS and S3 backends with uniform semantics; a persistent queue
//! schedules concurrent transfers with resume, retry and cancellation;
//! auxiliary services provide directory comparison, local-to-remote
//! mirroring, external editing with automatic re-upload, and encrypted
//! credential storage.
//!
//! The engine is presentation-agnostic: state changes surface as
//! `tokio::sync::broadcast` snapshots, never shared memory, so any shell
//! (desktop UI, CLI, tests) can subscribe.
//!
//! ## Services
//!
//! - [`remote::RemoteDispatcher`] — the uniform remote surface
//! - [`queue::TransferQueue`] — persistent FIFO transfer scheduler
//! - [`sync::SyncEngine`] — first-level directory comparison
//! - [`watcher::MirrorWatcher`] — local tree mirroring into the remote
//! - [`edit::EditBridge`] — edit-externally round trips
//! - [`crypto::CryptoStore`] — process-wide secret encryption
//! - [`profiles::ProfileStore`] / [`settings::SettingsStore`] — persistence

pub mod crypto;
pub mod edit;
pub mod logging;
pub mod profiles;
pub mod queue;
pub mod remote;
pub mod settings;
pub mod staging;
pub mod sync;
pub mod watcher;

pub use skiff_core::{
    cancel::CancelToken,
    error::{RemoteError, RemoteErrorKind, RemoteResult},
    paths, types,
};
pub use skiff_sftp::ShellChannel;

use std::path::PathBuf;
use std::sync::Arc;

/// Per-user application data directory holding `profiles.json`,
/// `settings.json` and `transfers.json`.
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("skiff")
}

/// The wired-up engine. Construction follows the required initialisation
/// order: settings, crypto (stays locked until a passphrase arrives),
/// profiles, queue (loads persisted state), watcher — and sweeps stale
/// staging directories from previous runs.
pub struct Engine {
    pub settings: settings::SettingsStoreState,
    pub profiles: profiles::ProfileStoreState,
    pub dispatcher: remote::RemoteDispatcherState,
    pub queue: queue::TransferQueueState,
    pub sync: sync::SyncEngineState,
    pub watcher: watcher::MirrorWatcherState,
    pub edit: edit::EditBridgeState,
}

impl Engine {
    /// Initialise against the default per-user data directory.
    pub fn init() -> Self {
        Self::init_at(app_data_dir())
    }

    /// Initialise with an explicit data directory (tests point this at a
    /// scratch dir).
    pub fn init_at(data_dir: PathBuf) -> Self {
        let swept = staging::sweep_stage_dirs();
        if swept > 0 {
            log::info!("engine: swept {} stale staging dir(s)", swept);
        }

        let settings = settings::SettingsStore::new(data_dir.join("settings.json"));
        let profiles = profiles::ProfileStore::new(data_dir.join("profiles.json"));
        let dispatcher: remote::RemoteDispatcherState = Arc::new(remote::RemoteDispatcher::new());
        let queue = queue::TransferQueue::new(dispatcher.clone(), data_dir.join("transfers.json"));
        let sync = sync::SyncEngine::new(dispatcher.clone());
        let watcher = watcher::MirrorWatcher::new(queue.clone());
        let edit = edit::EditBridge::new(dispatcher.clone());

        Self { settings, profiles, dispatcher, queue, sync, watcher, edit }
    }

    /// Start background processing (resumes interrupted transfers).
    pub fn start(&self) {
        self.queue.start();
    }

    /// Teardown in reverse initialisation order.
    pub async fn shutdown(&self) {
        for root in self.watcher.watched_roots() {
            let _ = self.watcher.stop(&root);
        }
        self.dispatcher.disconnect().await;
        crypto::CryptoStore::clear();
    }
}
