//! Session scoped temp files for sources that only exist inside jars.
//!
//! Editors can only open real files, so source text pulled out of an
//! external source jar is written to a temp file once per session and the
//! same file is handed out for every later request. Everything is deleted on
//! [`TempFileCache::shutdown`] or when the cache is dropped.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

use crate::error::{FinderError, Result};

pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

#[derive(Debug, Clone)]
struct CachedFile {
    path: PathBuf,
    created: SystemTime,
}

pub struct TempFileCache {
    dir: TempDir,
    clock: Arc<dyn Clock>,
    files: Mutex<HashMap<String, CachedFile>>,
}

impl TempFileCache {
    pub fn new(parent: &Path, clock: Arc<dyn Clock>) -> Result<Self> {
        std::fs::create_dir_all(parent).map_err(|e| FinderError::io(parent, e))?;
        let dir = tempfile::Builder::new()
            .prefix("session-")
            .tempdir_in(parent)
            .map_err(|e| FinderError::io(parent, e))?;
        tracing::debug!(dir = %dir.path().display(), "created temp file cache");
        Ok(Self {
            dir,
            clock,
            files: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the temp file for `key`, writing `contents` only the first
    /// time the key is seen.
    pub fn materialize(&self, key: &str, contents: &str, extension: &str) -> Result<PathBuf> {
        let mut files = self.lock();
        if let Some(cached) = files.get(key)
            && cached.path.exists()
        {
            return Ok(cached.path.clone());
        }

        let path = self.dir.path().join(file_name(key, extension));
        std::fs::write(&path, contents).map_err(|e| FinderError::io(&path, e))?;
        files.insert(
            key.to_string(),
            CachedFile {
                path: path.clone(),
                created: self.clock.now(),
            },
        );
        Ok(path)
    }

    /// Deletes files created more than `max_age` ago. Returns how many were
    /// removed.
    pub fn evict_older_than(&self, max_age: Duration) -> usize {
        let now = self.clock.now();
        let mut files = self.lock();
        let stale: Vec<String> = files
            .iter()
            .filter(|(_, f)| now.duration_since(f.created).unwrap_or_default() > max_age)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &stale {
            if let Some(file) = files.remove(key)
                && let Err(e) = std::fs::remove_file(&file.path)
            {
                tracing::warn!(path = %file.path.display(), error = %e, "cannot remove temp file");
            }
        }
        stale.len()
    }

    /// Removes the cache directory and everything in it.
    pub fn shutdown(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        let count = self.len();
        self.dir.close().map_err(|e| FinderError::io(&path, e))?;
        tracing::debug!(dir = %path.display(), files = count, "removed temp file cache");
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CachedFile>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// `Widget-1a2b3c4d5e6f7a8b.kt` for key `.../com/acme/Widget.kt`.
fn file_name(key: &str, extension: &str) -> String {
    let last = key.rsplit(['/', '!']).next().unwrap_or(key);
    let stem = match last.rfind('.') {
        Some(idx) if idx > 0 => &last[..idx],
        _ => last,
    };
    let stem: String = stem
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    let digest = hex::encode(Sha256::digest(key.as_bytes()));
    let extension = extension.trim_start_matches('.');
    if extension.is_empty() {
        format!("{stem}-{}", &digest[..16])
    } else {
        format!("{stem}-{}.{extension}", &digest[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::UNIX_EPOCH;

    #[derive(Default)]
    struct ManualClock {
        secs: AtomicU64,
    }

    impl ManualClock {
        fn advance(&self, secs: u64) {
            self.secs.fetch_add(secs, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> SystemTime {
            UNIX_EPOCH + Duration::from_secs(self.secs.load(Ordering::SeqCst))
        }
    }

    #[test]
    fn materialize_reuses_files_per_key() {
        let parent = tempfile::tempdir().unwrap();
        let cache = TempFileCache::new(parent.path(), Arc::new(SystemClock)).unwrap();

        let key = "/out/acme-sources.jar!/com/acme/Widget.kt";
        let first = cache.materialize(key, "class Widget", "kt").unwrap();
        let second = cache.materialize(key, "ignored", ".kt").unwrap();
        assert_eq!(first, second);
        assert_eq!(std::fs::read_to_string(&first).unwrap(), "class Widget");
        assert!(first.file_name().unwrap().to_string_lossy().starts_with("Widget-"));
        assert_eq!(first.extension().unwrap(), "kt");

        let other = cache.materialize("/out/b.jar!/Widget.kt", "x", "kt").unwrap();
        assert_ne!(first, other);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn evicts_by_injected_clock() {
        let parent = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::default());
        let cache = TempFileCache::new(parent.path(), clock.clone()).unwrap();

        let old = cache.materialize("old", "a", "kt").unwrap();
        clock.advance(100);
        let fresh = cache.materialize("fresh", "b", "kt").unwrap();
        clock.advance(10);

        assert_eq!(cache.evict_older_than(Duration::from_secs(50)), 1);
        assert!(!old.exists());
        assert!(fresh.exists());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn shutdown_removes_directory() {
        let parent = tempfile::tempdir().unwrap();
        let cache = TempFileCache::new(parent.path(), Arc::new(SystemClock)).unwrap();
        let file = cache.materialize("k", "v", "java").unwrap();
        let dir = cache.dir().to_path_buf();
        assert!(file.starts_with(&dir));

        cache.shutdown().unwrap();
        assert!(!file.exists());
        assert!(!dir.exists());
    }
}
