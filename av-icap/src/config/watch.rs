//! Hot reload of the scanner properties file.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use notify::event::{EventKind, ModifyKind};
use notify::{RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::cache::ConfigCache;

/// Spawn a task that watches the configuration file and invalidates the
/// cache when the file changes on disk.
///
/// The watcher observes the file's parent directory, so editors that replace
/// the file (rename-over) are seen as well. A deleted file only invalidates
/// the cache; the reload happens once the file reappears and is read again.
/// The task ends when `shutdown` flips to `true` or its sender is dropped.
pub fn spawn_config_watch(
    cache: Arc<ConfigCache>,
    config_path: PathBuf,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (tx, mut rx) = mpsc::channel::<notify::Result<notify::Event>>(16);

        // The notify callback runs on the watcher's own thread, hence the
        // blocking send into the async side.
        let mut watcher = match notify::recommended_watcher(move |res| {
            let _ = tx.blocking_send(res);
        }) {
            Ok(watcher) => watcher,
            Err(err) => {
                error!(error = %err, "cannot create configuration watcher");
                return;
            }
        };

        let watch_dir = config_path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        if let Err(err) = watcher.watch(&watch_dir, RecursiveMode::NonRecursive) {
            error!(path = %watch_dir.display(), error = %err, "cannot watch configuration directory");
            return;
        }
        info!(path = %config_path.display(), "watching configuration file for changes");

        let mut last_modified = modified_at(&config_path);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("configuration watcher shutting down");
                        return;
                    }
                }
                event = rx.recv() => {
                    let event = match event {
                        Some(Ok(event)) => event,
                        Some(Err(err)) => {
                            warn!(error = %err, "configuration watch error");
                            continue;
                        }
                        None => return,
                    };
                    if !event.paths.iter().any(|p| p.file_name() == config_path.file_name()) {
                        continue;
                    }
                    handle_event(&cache, &config_path, &event, &mut last_modified);
                }
            }
        }
    })
}

fn handle_event(
    cache: &ConfigCache,
    config_path: &std::path::Path,
    event: &notify::Event,
    last_modified: &mut Option<SystemTime>,
) {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Any | ModifyKind::Data(_) | ModifyKind::Name(_)) => {
            // Editors fire several events per save; only a real mtime change
            // triggers a reload.
            let modified = modified_at(config_path);
            if modified.is_some() && modified == *last_modified {
                return;
            }
            *last_modified = modified;
            info!(path = %config_path.display(), "configuration file changed, reloading");
            cache.invalidate();
            let _ = cache.get(config_path);
            if !cache.is_loaded() {
                // An edit that breaks validation leaves the cache empty until
                // the next good save.
                warn!(path = %config_path.display(), "reload after change did not yield a configuration");
            }
        }
        EventKind::Remove(_) => {
            error!(path = %config_path.display(), "configuration file was deleted");
            *last_modified = None;
            cache.invalidate();
        }
        _ => {}
    }
}

fn modified_at(path: &std::path::Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
