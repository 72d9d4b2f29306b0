//! Transfer-queue lifecycle: concurrency bound, cancellation, retry,
//! startup recovery and resume accounting.

mod common;

use common::{wait_for, FakeBackend};
use skiff::queue::{TransferQueue, MAX_CONCURRENT};
use skiff::types::{TransferDirection, TransferStatus, TransferTask};
use std::sync::atomic::Ordering;
use std::time::Duration;

fn scratch_file(dir: &tempfile::TempDir, name: &str, len: usize) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, vec![1u8; len]).unwrap();
    path.to_string_lossy().into_owned()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrency_cap_and_all_complete() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::with(200, Duration::from_millis(10), 1000);
    let queue = TransferQueue::new(backend.clone(), dir.path().join("transfers.json"));

    let mut ids = Vec::new();
    for i in 0..10 {
        let local = scratch_file(&dir, &format!("f{}.bin", i), 1000);
        ids.push(queue.enqueue(TransferDirection::Upload, &local, &format!("/srv/f{}.bin", i), 1000));
    }

    let done = wait_for(Duration::from_secs(15), || {
        queue
            .tasks()
            .iter()
            .all(|t| t.status == TransferStatus::Completed)
    })
    .await;
    assert!(done, "all ten tasks should complete");

    // Never more than the bound in flight.
    assert!(backend.max_active.load(Ordering::SeqCst) <= MAX_CONCURRENT);
    // No task was promoted twice.
    for count in backend.starts.lock().unwrap().values() {
        assert_eq!(*count, 1);
    }
    // Ten distinct ids, all accounted for.
    assert_eq!(ids.len(), 10);
    assert_eq!(queue.tasks().len(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_mid_transfer_stops_promptly() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::with(100, Duration::from_millis(30), 0);
    let store = dir.path().join("transfers.json");
    let queue = TransferQueue::new(backend, store.clone());

    let local = scratch_file(&dir, "big.bin", 100_000);
    let id = queue.enqueue(TransferDirection::Upload, &local, "/srv/big.bin", 100_000);

    // Wait for the first progress tick.
    let progressed = wait_for(Duration::from_secs(5), || {
        queue.tasks()[0].transferred > 0
    })
    .await;
    assert!(progressed);

    queue.cancel(&id).unwrap();
    // Status flips immediately.
    assert_eq!(queue.tasks()[0].status, TransferStatus::Cancelled);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let frozen = queue.tasks()[0].transferred;
    tokio::time::sleep(Duration::from_millis(300)).await;
    // No further progress after the backend observed the token.
    assert_eq!(queue.tasks()[0].transferred, frozen);

    // The cancelled state reached disk.
    let persisted: Vec<TransferTask> =
        serde_json::from_str(&std::fs::read_to_string(&store).unwrap()).unwrap();
    assert_eq!(persisted[0].status, TransferStatus::Cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn transient_failure_retries_then_completes() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::with(100, Duration::from_millis(5), 0);
    backend.plan_failures("/srv/flaky.bin", 1);
    let queue = TransferQueue::new(backend.clone(), dir.path().join("transfers.json"));

    let local = scratch_file(&dir, "flaky.bin", 1000);
    queue.enqueue(TransferDirection::Upload, &local, "/srv/flaky.bin", 1000);

    let done = wait_for(Duration::from_secs(10), || {
        queue.tasks()[0].status == TransferStatus::Completed
    })
    .await;
    assert!(done, "task should complete on second attempt");

    let task = &queue.tasks()[0];
    assert_eq!(task.retries, 1);
    assert_eq!(task.error, None);
    assert_eq!(backend.starts.lock().unwrap()["/srv/flaky.bin"], 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn exhausted_retries_mark_failed_with_annotation() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::with(100, Duration::from_millis(5), 0);
    // More failures than the retry budget.
    backend.plan_failures("/srv/doomed.bin", 10);
    let queue = TransferQueue::new(backend, dir.path().join("transfers.json"));

    let local = scratch_file(&dir, "doomed.bin", 1000);
    queue.enqueue(TransferDirection::Upload, &local, "/srv/doomed.bin", 1000);

    let done = wait_for(Duration::from_secs(10), || {
        queue.tasks()[0].status == TransferStatus::Failed
    })
    .await;
    assert!(done, "task should fail after exhausting retries");

    let task = &queue.tasks()[0];
    assert_eq!(task.retries, 4); // 1 initial + 3 retries, all failed
    assert!(task.error.is_some());
    assert_eq!(task.speed, 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn startup_recovery_resumes_interrupted_download() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("transfers.json");
    let local = dir.path().join("partial.bin");
    std::fs::write(&local, vec![0u8; 300]).unwrap();

    // A queue persisted mid-download: task was active at 300/1000.
    let mut task = TransferTask::new(
        TransferDirection::Download,
        local.to_string_lossy(),
        "/srv/partial.bin",
        "partial.bin",
        1000,
    );
    task.status = TransferStatus::Active;
    task.transferred = 300;
    std::fs::write(&store, serde_json::to_string(&[task]).unwrap()).unwrap();

    let backend = FakeBackend::with(100, Duration::from_millis(5), 1000);
    let queue = TransferQueue::new(backend, store);

    // Reloaded as interrupted with its byte count intact.
    let reloaded = &queue.tasks()[0];
    assert_eq!(reloaded.status, TransferStatus::Interrupted);
    assert_eq!(reloaded.transferred, 300);

    queue.start();
    let done = wait_for(Duration::from_secs(10), || {
        queue.tasks()[0].status == TransferStatus::Completed
    })
    .await;
    assert!(done);

    // The backend appended from the offset: byte-complete file, no overlap.
    assert_eq!(std::fs::metadata(&local).unwrap().len(), 1000);
    assert_eq!(queue.tasks()[0].transferred, 1000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn offsetless_backend_restart_is_tolerated() {
    // Object-store uploads ignore the resume offset and restart from zero;
    // the queue must absorb the one-time non-monotonic progress reset.
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("transfers.json");
    let local = scratch_file(&dir, "object.bin", 1000);

    let mut task = TransferTask::new(
        TransferDirection::Upload,
        &local,
        "/bucket/object.bin",
        "object.bin",
        1000,
    );
    task.status = TransferStatus::Active;
    task.transferred = 600;
    std::fs::write(&store, serde_json::to_string(&[task]).unwrap()).unwrap();

    let backend = FakeBackend::s3_like(100, Duration::from_millis(5));
    let queue = TransferQueue::new(backend, store);
    queue.start();

    let done = wait_for(Duration::from_secs(10), || {
        queue.tasks()[0].status == TransferStatus::Completed
    })
    .await;
    assert!(done);
    assert_eq!(queue.tasks()[0].transferred, 1000);
    assert_eq!(queue.tasks()[0].progress, 100.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn manual_retry_after_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::with(100, Duration::from_millis(20), 0);
    let queue = TransferQueue::new(backend, dir.path().join("transfers.json"));

    let local = scratch_file(&dir, "again.bin", 2000);
    let id = queue.enqueue(TransferDirection::Upload, &local, "/srv/again.bin", 2000);

    wait_for(Duration::from_secs(5), || queue.tasks()[0].transferred > 0).await;
    queue.cancel(&id).unwrap();
    wait_for(Duration::from_secs(2), || {
        queue.tasks()[0].status == TransferStatus::Cancelled
    })
    .await;

    queue.retry(&id).unwrap();
    let done = wait_for(Duration::from_secs(10), || {
        queue.tasks()[0].status == TransferStatus::Completed
    })
    .await;
    assert!(done);
    assert_eq!(queue.tasks()[0].retries, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn snapshots_reach_subscribers() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::with(500, Duration::from_millis(5), 0);
    let queue = TransferQueue::new(backend, dir.path().join("transfers.json"));
    let mut events = queue.subscribe();

    let local = scratch_file(&dir, "watched.bin", 1000);
    queue.enqueue(TransferDirection::Upload, &local, "/srv/watched.bin", 1000);

    // First snapshot carries the admission.
    let snapshot = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("snapshot in time")
        .expect("channel open");
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].remote_path, "/srv/watched.bin");
}
