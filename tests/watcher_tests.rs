//! Mirror-watcher behaviour: coalescing, dotfile filtering, nested paths.

mod common;

use common::{wait_for, FakeBackend};
use skiff::queue::TransferQueue;
use skiff::types::{TransferDirection, TransferStatus};
use skiff::watcher::MirrorWatcher;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn write_burst_produces_one_upload() {
    let data_dir = tempfile::tempdir().unwrap();
    let watch_dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::with(1000, Duration::from_millis(1), 0);
    let queue = TransferQueue::new(backend, data_dir.path().join("transfers.json"));
    let watcher = MirrorWatcher::new(queue.clone());

    let root = watch_dir.path().to_string_lossy().into_owned();
    watcher.start(&root, "/remote/dir").unwrap();
    assert!(watcher.active(&root));

    // A burst of writes inside the 1 s stability window.
    let file = watch_dir.path().join("report.txt");
    for i in 0..5 {
        std::fs::write(&file, format!("draft {}", i)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let enqueued = wait_for(Duration::from_secs(5), || !queue.tasks().is_empty()).await;
    assert!(enqueued, "settled write should enqueue an upload");

    // Give any (wrong) duplicate time to appear.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let tasks = queue.tasks();
    assert_eq!(tasks.len(), 1, "burst must coalesce into one task");
    assert_eq!(tasks[0].direction, TransferDirection::Upload);
    assert_eq!(tasks[0].remote_path, "/remote/dir/report.txt");

    let done = wait_for(Duration::from_secs(5), || {
        queue.tasks()[0].status == TransferStatus::Completed
    })
    .await;
    assert!(done);

    watcher.stop(&root).unwrap();
    assert!(!watcher.active(&root));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dotfiles_are_ignored() {
    let data_dir = tempfile::tempdir().unwrap();
    let watch_dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::with(1000, Duration::from_millis(1), 0);
    let queue = TransferQueue::new(backend, data_dir.path().join("transfers.json"));
    let watcher = MirrorWatcher::new(queue.clone());

    let root = watch_dir.path().to_string_lossy().into_owned();
    watcher.start(&root, "/remote").unwrap();

    std::fs::write(watch_dir.path().join(".hidden"), b"secret").unwrap();
    std::fs::create_dir(watch_dir.path().join(".git")).unwrap();
    std::fs::write(watch_dir.path().join(".git").join("config"), b"x").unwrap();

    tokio::time::sleep(Duration::from_millis(2000)).await;
    assert!(queue.tasks().is_empty(), "dotfiles must not enqueue uploads");

    watcher.stop(&root).unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn nested_files_join_with_posix_separators() {
    let data_dir = tempfile::tempdir().unwrap();
    let watch_dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::with(1000, Duration::from_millis(1), 0);
    let queue = TransferQueue::new(backend, data_dir.path().join("transfers.json"));
    let watcher = MirrorWatcher::new(queue.clone());

    let root = watch_dir.path().to_string_lossy().into_owned();
    watcher.start(&root, "/remote/root/").unwrap();

    std::fs::create_dir_all(watch_dir.path().join("sub").join("deep")).unwrap();
    std::fs::write(
        watch_dir.path().join("sub").join("deep").join("data.bin"),
        vec![0u8; 64],
    )
    .unwrap();

    let enqueued = wait_for(Duration::from_secs(5), || {
        queue
            .tasks()
            .iter()
            .any(|t| t.remote_path == "/remote/root/sub/deep/data.bin")
    })
    .await;
    assert!(enqueued);

    watcher.stop(&root).unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn watch_roots_are_independent() {
    let data_dir = tempfile::tempdir().unwrap();
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let backend = FakeBackend::with(1000, Duration::from_millis(1), 0);
    let queue = TransferQueue::new(backend, data_dir.path().join("transfers.json"));
    let watcher = MirrorWatcher::new(queue.clone());

    let root_a = dir_a.path().to_string_lossy().into_owned();
    let root_b = dir_b.path().to_string_lossy().into_owned();
    watcher.start(&root_a, "/a").unwrap();
    watcher.start(&root_b, "/b").unwrap();
    assert!(watcher.start(&root_a, "/a-again").is_err());

    watcher.stop(&root_a).unwrap();
    assert!(!watcher.active(&root_a));
    assert!(watcher.active(&root_b));

    // The surviving root still mirrors.
    std::fs::write(dir_b.path().join("alive.txt"), b"ping").unwrap();
    let enqueued = wait_for(Duration::from_secs(5), || {
        queue.tasks().iter().any(|t| t.remote_path == "/b/alive.txt")
    })
    .await;
    assert!(enqueued);

    watcher.stop(&root_b).unwrap();
}
