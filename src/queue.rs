//! Persistent transfer queue.
//!
//! Strict FIFO over a concurrency bound of three. Tasks are persisted to
//! `transfers.json` after every status change and on each ≥500 ms progress
//! tick, so a crash can always be recovered: anything that was `active` or
//! `pending` reloads as `interrupted` and is re-promoted with its resume
//! offset.
//!
//! The queue owns the task list outright; subscribers receive full-queue
//! snapshots over a broadcast channel and never share memory with the
//! scheduler.

use crate::remote::TransferBackend;
use log::{info, warn};
use skiff_core::types::{TransferDirection, TransferStatus, TransferTask};
use skiff_core::{CancelToken, ProgressFn, RemoteError};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;
use tokio::sync::broadcast;

/// At most this many tasks run in parallel.
pub const MAX_CONCURRENT: usize = 3;
/// Automatic retries per task before it is marked failed.
pub const MAX_RETRIES: u32 = 3;
/// Minimum interval between speed recomputations and progress persists.
const TICK_MILLIS: u128 = 500;

struct RateWindow {
    at: Instant,
    bytes: u64,
}

#[derive(Default)]
struct QueueState {
    tasks: Vec<TransferTask>,
    controllers: HashMap<String, CancelToken>,
    rates: HashMap<String, RateWindow>,
}

pub struct TransferQueue {
    backend: Arc<dyn TransferBackend>,
    state: Mutex<QueueState>,
    events: broadcast::Sender<Vec<TransferTask>>,
    store_path: PathBuf,
    /// Back-reference for spawning runner tasks from `&self` methods.
    me: Weak<TransferQueue>,
}

pub type TransferQueueState = Arc<TransferQueue>;

impl TransferQueue {
    /// Load persisted tasks and apply startup recovery: anything that was
    /// in flight at the previous shutdown becomes `interrupted`.
    pub fn new(backend: Arc<dyn TransferBackend>, store_path: PathBuf) -> Arc<Self> {
        let mut tasks = load_tasks(&store_path);
        let mut recovered = 0usize;
        for task in &mut tasks {
            if matches!(task.status, TransferStatus::Active | TransferStatus::Pending) {
                task.status = TransferStatus::Interrupted;
                task.speed = 0.0;
                recovered += 1;
            }
        }
        if recovered > 0 {
            info!("queue: {} task(s) recovered as interrupted", recovered);
        }

        let (events, _) = broadcast::channel(64);
        let queue = Arc::new_cyclic(|me| Self {
            backend,
            state: Mutex::new(QueueState { tasks, ..Default::default() }),
            events,
            store_path,
            me: me.clone(),
        });
        queue.with_state(|_| {}); // persist the recovery rewrite
        queue
    }

    /// Begin processing: promotes whatever is ready, including recovered
    /// interrupted tasks.
    pub fn start(&self) {
        self.pump();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Vec<TransferTask>> {
        self.events.subscribe()
    }

    pub fn tasks(&self) -> Vec<TransferTask> {
        self.state.lock().unwrap().tasks.clone()
    }

    // ─── Admission ───────────────────────────────────────────────

    /// Enqueue a transfer; returns the assigned task id.
    pub fn enqueue(
        &self,
        direction: TransferDirection,
        local_path: &str,
        remote_path: &str,
        total: u64,
    ) -> String {
        let name = match direction {
            TransferDirection::Upload => std::path::Path::new(local_path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| local_path.to_string()),
            TransferDirection::Download => skiff_core::paths::file_name(remote_path),
        };
        let task = TransferTask::new(direction, local_path, remote_path, name, total);
        let id = task.id.clone();
        self.with_state(|state| state.tasks.push(task));
        self.pump();
        id
    }

    // ─── Control ─────────────────────────────────────────────────

    /// Cancel a task. Takes effect immediately in the task list; the
    /// backend observes the token at its next I/O boundary.
    pub fn cancel(&self, id: &str) -> Result<(), String> {
        self.with_state(|state| {
            let task = find_task(&mut state.tasks, id)?;
            if task.status.is_terminal() {
                return Ok(());
            }
            task.status = TransferStatus::Cancelled;
            task.speed = 0.0;
            if let Some(token) = state.controllers.remove(id) {
                token.cancel();
            }
            state.rates.remove(id);
            Ok(())
        })
    }

    /// Flip a failed or cancelled task back to pending (fresh attempt), or
    /// kick the scheduler for an interrupted one (resumes at its offset).
    pub fn retry(&self, id: &str) -> Result<(), String> {
        let result = self.with_state(|state| {
            let task = find_task(&mut state.tasks, id)?;
            match task.status {
                TransferStatus::Failed | TransferStatus::Cancelled => {
                    task.status = TransferStatus::Pending;
                    task.retries = 0;
                    task.error = None;
                    task.transferred = 0;
                    task.progress = 0.0;
                    task.speed = 0.0;
                    Ok(())
                }
                TransferStatus::Interrupted => Ok(()),
                _ => Err(format!("Task '{}' is not retryable", id)),
            }
        });
        if result.is_ok() {
            self.pump();
        }
        result
    }

    pub fn retry_all(&self) {
        self.with_state(|state| {
            for task in &mut state.tasks {
                if matches!(task.status, TransferStatus::Failed | TransferStatus::Cancelled) {
                    task.status = TransferStatus::Pending;
                    task.retries = 0;
                    task.error = None;
                    task.transferred = 0;
                    task.progress = 0.0;
                    task.speed = 0.0;
                }
            }
        });
        self.pump();
    }

    /// Drop a task from the list. Active tasks must be cancelled first.
    pub fn remove(&self, id: &str) -> Result<(), String> {
        self.with_state(|state| {
            let task = find_task(&mut state.tasks, id)?;
            if task.status == TransferStatus::Active {
                return Err(format!("Task '{}' is active; cancel it first", id));
            }
            state.tasks.retain(|t| t.id != id);
            state.rates.remove(id);
            Ok(())
        })
    }

    pub fn clear_finished(&self) -> usize {
        self.with_state(|state| {
            let before = state.tasks.len();
            state.tasks.retain(|t| !t.status.is_terminal());
            before - state.tasks.len()
        })
    }

    // ─── Scheduler ───────────────────────────────────────────────

    /// Promote ready tasks into free slots, strictly in enqueue order.
    fn pump(&self) {
        let promotions = self.with_state(|state| {
            let mut active = state
                .tasks
                .iter()
                .filter(|t| t.status == TransferStatus::Active)
                .count();
            let mut promotions = Vec::new();

            while active < MAX_CONCURRENT {
                let Some(task) = state.tasks.iter_mut().find(|t| {
                    matches!(t.status, TransferStatus::Pending | TransferStatus::Interrupted)
                }) else {
                    break;
                };

                // Interrupted tasks resume where the previous process
                // stopped; everything else starts from scratch.
                let offset = if task.status == TransferStatus::Interrupted {
                    task.transferred
                } else {
                    task.transferred = 0;
                    task.progress = 0.0;
                    0
                };
                task.status = TransferStatus::Active;
                task.speed = 0.0;
                task.error = None;

                let token = CancelToken::new();
                let id = task.id.clone();
                state.controllers.insert(id.clone(), token.clone());
                state.rates.insert(id.clone(), RateWindow { at: Instant::now(), bytes: offset });
                promotions.push(Promotion {
                    id,
                    direction: task.direction,
                    local_path: task.local_path.clone(),
                    remote_path: task.remote_path.clone(),
                    offset,
                    token,
                });
                active += 1;
            }
            promotions
        });

        let Some(queue) = self.me.upgrade() else {
            return; // engine is shutting down
        };
        for promotion in promotions {
            let queue = queue.clone();
            tokio::spawn(async move { queue.run_task(promotion).await });
        }
    }

    async fn run_task(self: Arc<Self>, promotion: Promotion) {
        let Promotion { id, direction, local_path, remote_path, offset, token } = promotion;

        let progress: ProgressFn = {
            let queue = self.clone();
            let id = id.clone();
            Arc::new(move |done, _chunk, total| queue.on_progress(&id, done, total))
        };

        let result = match direction {
            TransferDirection::Download => {
                self.backend
                    .download(&remote_path, &local_path, offset, progress, token.clone())
                    .await
            }
            TransferDirection::Upload => {
                self.backend
                    .upload(&local_path, &remote_path, offset, progress, token.clone())
                    .await
            }
        };

        match result {
            Ok(()) => self.complete(&id),
            Err(e) => self.fail_or_retry(&id, e),
        }
        self.pump();
    }

    // ─── Progress ────────────────────────────────────────────────

    /// Raw progress tick from a backend. Updates accounting and, at most
    /// every 500 ms, recomputes speed and persists.
    fn on_progress(&self, id: &str, done: u64, total: u64) {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let Some(task) = state.tasks.iter_mut().find(|t| t.id == id) else {
            return;
        };
        if task.status != TransferStatus::Active {
            // Cancelled mid-flight; the backend will notice the token soon.
            return;
        }

        task.transferred = done;
        if total > 0 {
            task.total = total;
        }
        task.progress = if task.total > 0 {
            (task.transferred as f64 / task.total as f64) * 100.0
        } else {
            0.0
        };

        let now = Instant::now();
        let window = state
            .rates
            .entry(id.to_string())
            .or_insert(RateWindow { at: now, bytes: done });

        // A backend that restarted from zero (S3 upload resume) reports a
        // smaller cumulative count once; re-base the window instead of
        // producing a negative rate.
        if done < window.bytes {
            window.at = now;
            window.bytes = done;
            return;
        }

        let elapsed = now.duration_since(window.at);
        if elapsed.as_millis() >= TICK_MILLIS {
            let delta = done - window.bytes;
            let task = state.tasks.iter_mut().find(|t| t.id == id).unwrap();
            task.speed = delta as f64 / elapsed.as_secs_f64();
            let window = state.rates.get_mut(id).unwrap();
            window.at = now;
            window.bytes = done;

            persist_tasks(&self.store_path, &state.tasks);
            let _ = self.events.send(state.tasks.clone());
        }
    }

    // ─── Terminal transitions ────────────────────────────────────

    fn complete(&self, id: &str) {
        self.with_state(|state| {
            if let Some(task) = state.tasks.iter_mut().find(|t| t.id == id) {
                if task.status != TransferStatus::Active {
                    return;
                }
                task.status = TransferStatus::Completed;
                if task.total > 0 {
                    task.transferred = task.total;
                }
                task.progress = 100.0;
                task.speed = 0.0;
                task.error = None;
            }
            state.controllers.remove(id);
            state.rates.remove(id);
        });
    }

    fn fail_or_retry(&self, id: &str, error: RemoteError) {
        self.with_state(|state| {
            state.controllers.remove(id);
            state.rates.remove(id);
            let Some(task) = state.tasks.iter_mut().find(|t| t.id == id) else {
                return;
            };
            if task.status == TransferStatus::Cancelled || error.is_cancelled() {
                // Cancellations are not failures.
                task.status = TransferStatus::Cancelled;
                task.speed = 0.0;
                return;
            }

            task.retries += 1;
            task.speed = 0.0;
            if task.retries <= MAX_RETRIES {
                warn!("queue: task {} retry {}/{}: {}", id, task.retries, MAX_RETRIES, error);
                task.status = TransferStatus::Pending;
                task.error = Some(format!("Retry {}/{}: {}", task.retries, MAX_RETRIES, error));
            } else {
                warn!("queue: task {} failed permanently: {}", id, error);
                task.status = TransferStatus::Failed;
                task.error = Some(error.to_string());
            }
        });
    }

    // ─── State plumbing ──────────────────────────────────────────

    /// Run a closure under the queue lock, then persist and emit. Every
    /// externally visible mutation goes through here, which keeps the
    /// persistence-after-change ordering trivially true.
    fn with_state<R>(&self, f: impl FnOnce(&mut QueueState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        let result = f(&mut state);
        persist_tasks(&self.store_path, &state.tasks);
        let _ = self.events.send(state.tasks.clone());
        result
    }
}

struct Promotion {
    id: String,
    direction: TransferDirection,
    local_path: String,
    remote_path: String,
    offset: u64,
    token: CancelToken,
}

fn find_task<'a>(
    tasks: &'a mut [TransferTask],
    id: &str,
) -> Result<&'a mut TransferTask, String> {
    tasks
        .iter_mut()
        .find(|t| t.id == id)
        .ok_or_else(|| format!("Task '{}' not found", id))
}

// ─── Persistence ─────────────────────────────────────────────────────

fn load_tasks(path: &PathBuf) -> Vec<TransferTask> {
    match std::fs::read_to_string(path) {
        Ok(json) => match serde_json::from_str(&json) {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!("queue: ignoring malformed {}: {}", path.display(), e);
                Vec::new()
            }
        },
        Err(_) => Vec::new(),
    }
}

/// Atomic write: temp file in the same directory, then rename, so a crash
/// mid-write never leaves a torn queue on disk.
fn persist_tasks(path: &PathBuf, tasks: &[TransferTask]) {
    let json = match serde_json::to_string_pretty(tasks) {
        Ok(json) => json,
        Err(e) => {
            warn!("queue: serialise failed: {}", e);
            return;
        }
    };
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let tmp = path.with_extension("json.tmp");
    if let Err(e) = std::fs::write(&tmp, &json).and_then(|_| std::fs::rename(&tmp, path)) {
        warn!("queue: persist to {} failed: {}", path.display(), e);
    }
}
