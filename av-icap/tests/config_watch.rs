//! Hot-reload behavior of the configuration watcher against a real
//! filesystem.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use av_icap::config::{spawn_config_watch, ConfigCache};

fn scanner_with_host(hostname: &str) -> String {
    format!(
        "s1.hostname={hostname}\ns1.port=1344\ns1.service=avscan\ns1.ICAPServerVersion=1.0\n"
    )
}

/// Poll until `predicate` holds or a generous deadline passes. File watching
/// is inherently asynchronous, the tests only assert eventual convergence.
async fn eventually<F: FnMut() -> bool>(mut predicate: F) -> bool {
    for _ in 0..200 {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn rewrite_triggers_a_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("av.properties");
    fs::write(&path, scanner_with_host("first.example.net")).unwrap();

    let cache = Arc::new(ConfigCache::new());
    assert_eq!(cache.get(&path).unwrap().hostname(), "first.example.net");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = spawn_config_watch(Arc::clone(&cache), path.clone(), shutdown_rx);

    // Filesystem mtime granularity can be a full second; make sure the
    // rewrite is distinguishable from the original write.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    fs::write(&path, scanner_with_host("second.example.net")).unwrap();

    let converged = eventually(|| {
        cache
            .get(&path)
            .map(|cfg| cfg.hostname() == "second.example.net")
            .unwrap_or(false)
    })
    .await;
    assert!(converged, "watcher never picked up the rewritten file");

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn deleting_the_file_invalidates_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("av.properties");
    fs::write(&path, scanner_with_host("av.example.net")).unwrap();

    let cache = Arc::new(ConfigCache::new());
    assert!(cache.get(&path).is_some());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = spawn_config_watch(Arc::clone(&cache), path.clone(), shutdown_rx);
    tokio::time::sleep(Duration::from_millis(200)).await;

    fs::remove_file(&path).unwrap();
    let invalidated = eventually(|| !cache.is_loaded()).await;
    assert!(invalidated, "watcher never reacted to the deletion");

    drop(shutdown_tx);
    handle.await.unwrap();
}

#[tokio::test]
async fn watcher_stops_on_shutdown_signal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("av.properties");
    fs::write(&path, scanner_with_host("av.example.net")).unwrap();

    let cache = Arc::new(ConfigCache::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = spawn_config_watch(cache, path, shutdown_rx);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("watcher did not stop after shutdown")
        .unwrap();
}
