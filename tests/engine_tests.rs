//! Engine wiring: initialisation order, disconnected-state errors,
//! staging sweep on startup.

use serial_test::serial;
use skiff::staging;
use skiff::types::Theme;
use skiff::{CancelToken, Engine, RemoteErrorKind};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial(staging)]
async fn init_start_shutdown_round_trip() {
    let data_dir = tempfile::tempdir().unwrap();
    let engine = Engine::init_at(data_dir.path().to_path_buf());
    engine.start();

    // Stores work against the scratch dir.
    let mut settings = engine.settings.load();
    settings.theme = Theme::Dark;
    engine.settings.save(&settings).unwrap();
    assert_eq!(engine.settings.load().theme, Theme::Dark);

    assert!(engine.profiles.load().is_empty());
    assert!(engine.queue.tasks().is_empty());

    engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial(staging)]
async fn operations_without_connection_fail_not_connected() {
    let data_dir = tempfile::tempdir().unwrap();
    let engine = Engine::init_at(data_dir.path().to_path_buf());

    let err = engine.dispatcher.list("/").await.unwrap_err();
    assert_eq!(err.kind, RemoteErrorKind::NotConnected);

    let err = engine
        .dispatcher
        .get("/a", "/tmp/a", CancelToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind, RemoteErrorKind::NotConnected);

    let err = engine.dispatcher.exec_command("uname -a").await.unwrap_err();
    assert_eq!(err.kind, RemoteErrorKind::NotConnected);

    engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial(staging)]
async fn startup_sweeps_stale_staging_dirs() {
    // A leftover from a previous "process".
    let stale = staging::create_stage_dir().unwrap();
    std::fs::write(stale.join("dragged.bin"), b"x").unwrap();
    assert!(stale.exists());

    let data_dir = tempfile::tempdir().unwrap();
    let engine = Engine::init_at(data_dir.path().to_path_buf());
    assert!(!stale.exists(), "init must sweep stale staging dirs");

    engine.shutdown().await;
}
