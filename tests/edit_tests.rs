//! External-edit bridge: download, debounced re-upload, serialised uploads.

mod common;

use common::{wait_for, FakeBackend};
use skiff::edit::{EditBridge, EditStatus};
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn open_downloads_then_changes_reupload() {
    let backend = FakeBackend::with(1000, Duration::from_millis(1), 64);
    let bridge = EditBridge::new(backend.clone());
    let mut events = bridge.subscribe();

    let local = bridge.open("/docs//readme.md").await.unwrap();
    assert!(local.exists());
    assert!(bridge.active("/docs/readme.md"));
    assert_eq!(local.file_name().unwrap(), "readme.md");

    // First edit round trip.
    std::fs::write(&local, b"edited once").unwrap();
    let uploaded = wait_for(Duration::from_secs(5), || {
        backend.completed_uploads.lock().unwrap().len() == 1
    })
    .await;
    assert!(uploaded, "settled change should upload exactly once");
    assert_eq!(
        backend.completed_uploads.lock().unwrap()[0],
        "/docs/readme.md"
    );

    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("edit-status event in time")
        .unwrap();
    assert_eq!(event.status, EditStatus::Uploaded);
    assert_eq!(event.remote_path, "/docs/readme.md");

    // A later, separate change produces exactly one more upload.
    std::fs::write(&local, b"edited twice").unwrap();
    let uploaded_again = wait_for(Duration::from_secs(5), || {
        backend.completed_uploads.lock().unwrap().len() == 2
    })
    .await;
    assert!(uploaded_again);

    bridge.close("/docs/readme.md").unwrap();
    assert!(!bridge.active("/docs/readme.md"));
    let _ = std::fs::remove_dir_all(local.parent().unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn write_burst_coalesces_into_one_upload() {
    let backend = FakeBackend::with(1000, Duration::from_millis(1), 64);
    let bridge = EditBridge::new(backend.clone());

    let local = bridge.open("/srv/notes.txt").await.unwrap();

    // Burst faster than the 100 ms settle window.
    for i in 0..8 {
        std::fs::write(&local, format!("burst {}", i)).unwrap();
        tokio::time::sleep(Duration::from_millis(15)).await;
    }

    wait_for(Duration::from_secs(5), || {
        !backend.completed_uploads.lock().unwrap().is_empty()
    })
    .await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(
        backend.completed_uploads.lock().unwrap().len(),
        1,
        "burst must produce a single upload"
    );

    bridge.close("/srv/notes.txt").unwrap();
    let _ = std::fs::remove_dir_all(local.parent().unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reopening_returns_the_same_staged_copy() {
    let backend = FakeBackend::with(1000, Duration::from_millis(1), 64);
    let bridge = EditBridge::new(backend.clone());

    let first = bridge.open("/srv/same.txt").await.unwrap();
    let second = bridge.open("/srv/same.txt").await.unwrap();
    assert_eq!(first, second);

    bridge.close("/srv/same.txt").unwrap();
    assert!(bridge.close("/srv/same.txt").is_err());
    let _ = std::fs::remove_dir_all(first.parent().unwrap());
}
