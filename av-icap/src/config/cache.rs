//! Lazily loaded, invalidation-driven configuration cache.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{error, info, warn};

use crate::config::holder::ScannerConfig;
use crate::config::loader;

#[derive(Debug, Default)]
struct CacheState {
    scanners: HashMap<String, Arc<ScannerConfig>>,
    /// Set only while exactly one scanner id is configured.
    active: Option<String>,
}

/// Caches the last successfully loaded scanner configuration.
///
/// `get` returns the cached value without touching the file system until
/// [`ConfigCache::invalidate`] is called; the next `get` then re-reads the
/// properties file. A failed reload leaves the cache unloaded so the read is
/// retried on the following `get`.
#[derive(Debug, Default)]
pub struct ConfigCache {
    loaded: AtomicBool,
    state: Mutex<CacheState>,
}

impl ConfigCache {
    pub fn new() -> ConfigCache {
        ConfigCache::default()
    }

    /// The active scanner's configuration, loading the file if necessary.
    ///
    /// Returns `None` when the file cannot be loaded or when more than one
    /// scanner id is configured; ambiguous setups must use
    /// [`ConfigCache::get_by_id`].
    pub fn get(&self, path: &Path) -> Option<Arc<ScannerConfig>> {
        let state = self.load_if_needed(path)?;
        let active = state.active.as_ref()?;
        state.scanners.get(active).cloned()
    }

    /// Configuration for a specific scanner id, loading the file if necessary.
    pub fn get_by_id(&self, path: &Path, scanner_id: &str) -> Option<Arc<ScannerConfig>> {
        let state = self.load_if_needed(path)?;
        state.scanners.get(scanner_id).cloned()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Mark the cached configuration stale. The next `get` re-reads the file;
    /// the current contents stay visible until then.
    pub fn invalidate(&self) {
        self.loaded.store(false, Ordering::Release);
    }

    fn load_if_needed(&self, path: &Path) -> Option<std::sync::MutexGuard<'_, CacheState>> {
        // Poisoning only means another thread panicked mid-reload; the state
        // itself is always a complete previous snapshot.
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if self.loaded.load(Ordering::Acquire) {
            return Some(state);
        }

        info!("Scanner configuration not present or modified - attempting to load it.");
        match loader::load(path) {
            Ok(loaded) => {
                state.scanners = loaded.scanners().clone();
                state.active = if state.scanners.len() == 1 {
                    state.scanners.keys().next().cloned()
                } else {
                    if state.scanners.len() > 1 {
                        warn!(
                            scanners = state.scanners.len(),
                            "multiple scanner ids configured, no active scanner selected"
                        );
                    }
                    None
                };
                self.loaded.store(true, Ordering::Release);
                info!("Scanner configuration successfully loaded.");
                Some(state)
            }
            Err(err) => {
                error!(error = %err, "scanner configuration could not be loaded");
                state.scanners.clear();
                state.active = None;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn single_scanner(hostname: &str) -> String {
        format!(
            "s1.hostname={hostname}\ns1.port=1344\ns1.service=avscan\ns1.ICAPServerVersion=1.0\n"
        )
    }

    #[test]
    fn cached_value_survives_file_change_until_invalidated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("av.properties");
        fs::write(&path, single_scanner("first.example.net")).unwrap();

        let cache = ConfigCache::new();
        assert_eq!(cache.get(&path).unwrap().hostname(), "first.example.net");
        assert!(cache.is_loaded());

        fs::write(&path, single_scanner("second.example.net")).unwrap();
        assert_eq!(cache.get(&path).unwrap().hostname(), "first.example.net");

        cache.invalidate();
        assert!(!cache.is_loaded());
        assert_eq!(cache.get(&path).unwrap().hostname(), "second.example.net");
    }

    #[test]
    fn failed_load_leaves_cache_unloaded_and_retries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("av.properties");

        let cache = ConfigCache::new();
        assert!(cache.get(&path).is_none());
        assert!(!cache.is_loaded());

        fs::write(&path, single_scanner("av.example.net")).unwrap();
        assert_eq!(cache.get(&path).unwrap().hostname(), "av.example.net");
    }

    #[test]
    fn multiple_scanner_ids_have_no_active_scanner() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("av.properties");
        fs::write(
            &path,
            "a.hostname=h\na.port=1\na.service=s\na.ICAPServerVersion=1.0\n\
             b.hostname=h\nb.port=2\nb.service=s\nb.ICAPServerVersion=1.0\n",
        )
        .unwrap();

        let cache = ConfigCache::new();
        assert!(cache.get(&path).is_none());
        assert_eq!(cache.get_by_id(&path, "a").unwrap().port(), 1);
        assert_eq!(cache.get_by_id(&path, "b").unwrap().port(), 2);
        assert!(cache.get_by_id(&path, "c").is_none());
    }
}
