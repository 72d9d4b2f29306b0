//! External-edit bridge.
//!
//! Opens a remote file for editing in whatever application the embedder
//! launches: the file is downloaded into its own staging directory, a
//! single-file watch re-uploads it after every settled change, and an
//! `edit-status` event reports each round trip. Uploads are serialised per
//! file — the debounce task performs them one at a time, so a write burst
//! during an in-flight upload simply schedules the next one.

use crate::remote::TransferBackend;
use crate::staging;
use log::{info, warn};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use skiff_core::types::no_progress;
use skiff_core::{paths, CancelToken, RemoteResult};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// Quiescence before a change is uploaded.
const SETTLE: Duration = Duration::from_millis(100);
const SCAN_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum EditStatus {
    Uploaded,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditStatusEvent {
    pub remote_path: String,
    pub status: EditStatus,
    #[serde(default)]
    pub message: Option<String>,
}

struct EditSession {
    local_path: PathBuf,
    _watcher: RecommendedWatcher,
    task: tokio::task::JoinHandle<()>,
}

pub struct EditBridge {
    backend: Arc<dyn TransferBackend>,
    events: broadcast::Sender<EditStatusEvent>,
    sessions: Mutex<HashMap<String, EditSession>>,
}

pub type EditBridgeState = Arc<EditBridge>;

impl EditBridge {
    pub fn new(backend: Arc<dyn TransferBackend>) -> Arc<Self> {
        let (events, _) = broadcast::channel(32);
        Arc::new(Self { backend, events, sessions: Mutex::new(HashMap::new()) })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EditStatusEvent> {
        self.events.subscribe()
    }

    /// Download `remote_path` into a fresh staging directory, start the
    /// re-upload watch, and return the local path for the embedder to open.
    pub async fn open(&self, remote_path: &str) -> RemoteResult<PathBuf> {
        let remote = paths::normalize(remote_path);
        if let Some(session) = self.sessions.lock().unwrap().get(&remote) {
            return Ok(session.local_path.clone());
        }

        let stage = staging::create_stage_dir()?;
        let local_path = stage.join(paths::file_name(&remote));
        self.backend
            .download(
                &remote,
                &local_path.to_string_lossy(),
                0,
                no_progress(),
                CancelToken::new(),
            )
            .await?;

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<()>();
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
                if let Ok(event) = res {
                    if matches!(event.kind, notify::EventKind::Modify(_) | notify::EventKind::Create(_)) {
                        let _ = tx.send(());
                    }
                }
            })
            .map_err(|e| skiff_core::RemoteError::internal(e.to_string()))?;
        watcher
            .watch(&local_path, RecursiveMode::NonRecursive)
            .map_err(|e| skiff_core::RemoteError::internal(e.to_string()))?;

        let task = tokio::spawn(reupload_loop(
            self.backend.clone(),
            self.events.clone(),
            local_path.clone(),
            remote.clone(),
            rx,
        ));

        self.sessions.lock().unwrap().insert(
            remote.clone(),
            EditSession { local_path: local_path.clone(), _watcher: watcher, task },
        );
        info!("edit: opened {} at {}", remote, local_path.display());
        Ok(local_path)
    }

    /// Stop watching an edited file. The staged copy stays on disk until
    /// the next startup sweep.
    pub fn close(&self, remote_path: &str) -> Result<(), String> {
        let remote = paths::normalize(remote_path);
        match self.sessions.lock().unwrap().remove(&remote) {
            Some(session) => {
                session.task.abort();
                info!("edit: closed {}", remote);
                Ok(())
            }
            None => Err(format!("'{}' is not open for editing", remote)),
        }
    }

    pub fn active(&self, remote_path: &str) -> bool {
        self.sessions
            .lock()
            .unwrap()
            .contains_key(&paths::normalize(remote_path))
    }
}

/// Debounce change notifications and upload the file after each settle.
///
/// The loop awaits each upload inline, which is the re-entrancy guard: a
/// second upload for the same file cannot start while one is in flight.
/// Events arriving meanwhile stay queued and trigger exactly one follow-up
/// upload after completion.
async fn reupload_loop(
    backend: Arc<dyn TransferBackend>,
    events: broadcast::Sender<EditStatusEvent>,
    local_path: PathBuf,
    remote_path: String,
    mut rx: tokio::sync::mpsc::UnboundedReceiver<()>,
) {
    let mut dirty_at: Option<Instant> = None;
    let mut tick = tokio::time::interval(SCAN_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            received = rx.recv() => {
                match received {
                    Some(()) => dirty_at = Some(Instant::now()),
                    None => break,
                }
            }
            _ = tick.tick() => {
                let settled = dirty_at
                    .map(|at| at.elapsed() >= SETTLE)
                    .unwrap_or(false);
                if !settled {
                    continue;
                }
                dirty_at = None;

                let result = backend
                    .upload(
                        &local_path.to_string_lossy(),
                        &remote_path,
                        0,
                        no_progress(),
                        CancelToken::new(),
                    )
                    .await;

                let event = match result {
                    Ok(()) => {
                        info!("edit: re-uploaded {}", remote_path);
                        EditStatusEvent {
                            remote_path: remote_path.clone(),
                            status: EditStatus::Uploaded,
                            message: None,
                        }
                    }
                    Err(e) => {
                        warn!("edit: re-upload of {} failed: {}", remote_path, e);
                        EditStatusEvent {
                            remote_path: remote_path.clone(),
                            status: EditStatus::Error,
                            message: Some(e.to_string()),
                        }
                    }
                };
                let _ = events.send(event);
            }
        }
    }
}
