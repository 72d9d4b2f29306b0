//! Local-to-remote mirror watcher.
//!
//! One recursive filesystem observer per watch root. Writes coalesce: a
//! file must stay quiet for a full second before it counts as settled and
//! becomes one upload task — a burst of N change events within the window
//! produces exactly one enqueue. Dotfiles (any hidden path component) are
//! ignored. Watch roots are independent and may coexist.

use crate::queue::TransferQueueState;
use log::{info, warn};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use skiff_core::paths;
use skiff_core::types::TransferDirection;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Quiescence window before a changed file is uploaded.
const SETTLE: Duration = Duration::from_secs(1);
/// How often the debouncer scans its pending set.
const SCAN_INTERVAL: Duration = Duration::from_millis(250);

struct WatchHandle {
    // Held so the observer stays alive; dropping it stops the events.
    _watcher: RecommendedWatcher,
    task: tokio::task::JoinHandle<()>,
}

pub struct MirrorWatcher {
    queue: TransferQueueState,
    watches: Mutex<HashMap<String, WatchHandle>>,
}

pub type MirrorWatcherState = Arc<MirrorWatcher>;

impl MirrorWatcher {
    pub fn new(queue: TransferQueueState) -> Arc<Self> {
        Arc::new(Self { queue, watches: Mutex::new(HashMap::new()) })
    }

    /// Start mirroring `local_path` into `remote_path`.
    pub fn start(&self, local_path: &str, remote_path: &str) -> Result<(), String> {
        let root = PathBuf::from(local_path);
        if !root.is_dir() {
            return Err(format!("'{}' is not a directory", local_path));
        }
        let mut watches = self.watches.lock().unwrap();
        if watches.contains_key(local_path) {
            return Err(format!("Already watching '{}'", local_path));
        }

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<PathBuf>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                if matches!(
                    event.kind,
                    notify::EventKind::Create(_) | notify::EventKind::Modify(_)
                ) {
                    for path in event.paths {
                        let _ = tx.send(path);
                    }
                }
            }
        })
        .map_err(|e| format!("Failed to create watcher: {}", e))?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| format!("Failed to watch '{}': {}", local_path, e))?;

        let task = tokio::spawn(debounce_loop(
            self.queue.clone(),
            root,
            paths::normalize(remote_path),
            rx,
        ));

        watches.insert(local_path.to_string(), WatchHandle { _watcher: watcher, task });
        info!("watcher: mirroring {} -> {}", local_path, remote_path);
        Ok(())
    }

    /// Tear down the observer for a watch root.
    pub fn stop(&self, local_path: &str) -> Result<(), String> {
        match self.watches.lock().unwrap().remove(local_path) {
            Some(handle) => {
                handle.task.abort();
                info!("watcher: stopped {}", local_path);
                Ok(())
            }
            None => Err(format!("No watch on '{}'", local_path)),
        }
    }

    pub fn active(&self, local_path: &str) -> bool {
        self.watches.lock().unwrap().contains_key(local_path)
    }

    pub fn watched_roots(&self) -> Vec<String> {
        self.watches.lock().unwrap().keys().cloned().collect()
    }
}

/// Collect raw events and enqueue an upload once a file has been quiet for
/// the settle window.
async fn debounce_loop(
    queue: TransferQueueState,
    root: PathBuf,
    remote_root: String,
    mut rx: tokio::sync::mpsc::UnboundedReceiver<PathBuf>,
) {
    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();
    let mut tick = tokio::time::interval(SCAN_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            received = rx.recv() => {
                match received {
                    Some(path) => {
                        if !is_hidden(&root, &path) {
                            pending.insert(path, Instant::now());
                        }
                    }
                    None => break, // watcher dropped
                }
            }
            _ = tick.tick() => {
                let now = Instant::now();
                let settled: Vec<PathBuf> = pending
                    .iter()
                    .filter(|(_, at)| now.duration_since(**at) >= SETTLE)
                    .map(|(path, _)| path.clone())
                    .collect();
                for path in settled {
                    pending.remove(&path);
                    enqueue_upload(&queue, &root, &remote_root, &path);
                }
            }
        }
    }
}

fn enqueue_upload(queue: &TransferQueueState, root: &Path, remote_root: &str, path: &Path) {
    // Directory-creation events carry no payload; files only.
    let Ok(meta) = std::fs::metadata(path) else {
        return; // deleted before it settled
    };
    if !meta.is_file() {
        return;
    }
    let Ok(relative) = path.strip_prefix(root) else {
        warn!("watcher: event outside root: {}", path.display());
        return;
    };
    let posix_rel = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    let remote = paths::join(remote_root, &posix_rel);
    let id = queue.enqueue(
        TransferDirection::Upload,
        &path.to_string_lossy(),
        &remote,
        meta.len(),
    );
    info!("watcher: enqueued upload {} -> {} ({})", path.display(), remote, id);
}

/// Hidden when any component under the watch root starts with a dot.
fn is_hidden(root: &Path, path: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_detection() {
        let root = Path::new("/watch");
        assert!(is_hidden(root, Path::new("/watch/.git/config")));
        assert!(is_hidden(root, Path::new("/watch/sub/.hidden")));
        assert!(!is_hidden(root, Path::new("/watch/sub/file.txt")));
        // The root's own name being hidden does not matter.
        assert!(!is_hidden(Path::new("/home/.config/app"), Path::new("/home/.config/app/f")));
    }
}
