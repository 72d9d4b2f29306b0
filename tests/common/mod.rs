//! Shared test double: a scripted transfer backend.
#![allow(dead_code)] // each test binary uses its own subset

use async_trait::async_trait;
use skiff::remote::TransferBackend;
use skiff::types::ProgressFn;
use skiff::{CancelToken, RemoteError, RemoteResult};
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory backend that moves `chunk` bytes per `delay` tick and honours
/// the cancel token at every tick, like the real backends do.
pub struct FakeBackend {
    /// Bytes moved per tick.
    pub chunk: u64,
    /// Tick length.
    pub delay: Duration,
    /// Object size reported for downloads.
    pub download_total: u64,
    /// When set, uploads ignore a resume offset and restart from zero,
    /// mirroring the object-store backend.
    pub ignore_upload_offset: bool,
    /// remote path → number of times to fail with a transient error at
    /// roughly half the transfer.
    pub fail_plan: Mutex<HashMap<String, u32>>,
    /// Remote paths of completed uploads, in completion order.
    pub completed_uploads: Mutex<Vec<String>>,
    /// Transfer starts per remote path (a task must never run twice
    /// without an intervening retry).
    pub starts: Mutex<HashMap<String, u32>>,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl FakeBackend {
    pub fn with(chunk: u64, delay: Duration, download_total: u64) -> Arc<Self> {
        let mut backend = Self::new_inner();
        backend.chunk = chunk;
        backend.delay = delay;
        backend.download_total = download_total;
        Arc::new(backend)
    }

    fn new_inner() -> Self {
        Self {
            chunk: 100,
            delay: Duration::from_millis(10),
            download_total: 1000,
            ignore_upload_offset: false,
            fail_plan: Mutex::new(HashMap::new()),
            completed_uploads: Mutex::new(Vec::new()),
            starts: Mutex::new(HashMap::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn s3_like(chunk: u64, delay: Duration) -> Arc<Self> {
        let mut backend = Self::new_inner();
        backend.chunk = chunk;
        backend.delay = delay;
        backend.ignore_upload_offset = true;
        Arc::new(backend)
    }

    pub fn plan_failures(&self, remote: &str, count: u32) {
        self.fail_plan
            .lock()
            .unwrap()
            .insert(remote.to_string(), count);
    }

    fn track_start(&self, remote: &str) {
        *self
            .starts
            .lock()
            .unwrap()
            .entry(remote.to_string())
            .or_insert(0) += 1;
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
    }

    fn track_end(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    /// Fail once at ~50% if a failure is planned for this path.
    fn should_fail_at(&self, remote: &str, done: u64, total: u64) -> bool {
        if done * 2 < total {
            return false;
        }
        let mut plan = self.fail_plan.lock().unwrap();
        match plan.get_mut(remote) {
            Some(count) if *count > 0 => {
                *count -= 1;
                true
            }
            _ => false,
        }
    }

    async fn run(
        &self,
        remote: &str,
        offset: u64,
        total: u64,
        progress: &ProgressFn,
        cancel: &CancelToken,
        mut sink: Option<&mut std::fs::File>,
    ) -> RemoteResult<()> {
        let mut done = offset;
        while done < total {
            tokio::time::sleep(self.delay).await;
            if cancel.is_cancelled() {
                return Err(RemoteError::cancelled());
            }
            let n = self.chunk.min(total - done);
            if let Some(file) = sink.as_deref_mut() {
                file.write_all(&vec![0u8; n as usize])
                    .map_err(RemoteError::from)?;
            }
            done += n;
            progress(done, n, total);
            if self.should_fail_at(remote, done, total) {
                return Err(RemoteError::dropped("injected transient failure"));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TransferBackend for FakeBackend {
    async fn download(
        &self,
        remote: &str,
        local: &str,
        offset: u64,
        progress: ProgressFn,
        cancel: CancelToken,
    ) -> RemoteResult<()> {
        self.track_start(remote);
        let mut file = if offset > 0 {
            std::fs::OpenOptions::new()
                .append(true)
                .open(local)
                .map_err(RemoteError::from)?
        } else {
            if let Some(parent) = std::path::Path::new(local).parent() {
                std::fs::create_dir_all(parent).map_err(RemoteError::from)?;
            }
            std::fs::File::create(local).map_err(RemoteError::from)?
        };
        let result = self
            .run(
                remote,
                offset,
                self.download_total,
                &progress,
                &cancel,
                Some(&mut file),
            )
            .await;
        self.track_end();
        result
    }

    async fn upload(
        &self,
        local: &str,
        remote: &str,
        offset: u64,
        progress: ProgressFn,
        cancel: CancelToken,
    ) -> RemoteResult<()> {
        self.track_start(remote);
        let total = std::fs::metadata(local)
            .map(|m| m.len())
            .unwrap_or(self.download_total);
        let offset = if self.ignore_upload_offset { 0 } else { offset };
        let result = self.run(remote, offset, total, &progress, &cancel, None).await;
        if result.is_ok() {
            self.completed_uploads
                .lock()
                .unwrap()
                .push(remote.to_string());
        }
        self.track_end();
        result
    }
}

/// Poll until `pred` holds or `timeout` elapses; returns whether it held.
pub async fn wait_for(timeout: Duration, mut pred: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if pred() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    pred()
}
