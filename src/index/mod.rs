//! Fingerprinted, time-bounded cache of parsed corpora.
//!
//! One cache entry per corpus root. Entries expire after a TTL and are
//! additionally swept by a background task; `invalidate` drops an entry
//! immediately so the next `get` observes a fresh index.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::core::{DocIndex, Section, hex_digest};
use crate::error::{Error, Result};
use crate::parser;

/// Default cache TTL: five minutes.
pub const DEFAULT_TTL: Duration = Duration::from_millis(300_000);

/// Interval between background sweeps of expired entries.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Per-request cache controls.
#[derive(Debug, Clone, Copy)]
pub struct IndexOptions {
    /// Time-to-live for a stored entry.
    pub ttl: Duration,
    /// When `false`, bypass the cache entirely (read and write).
    pub cache_enabled: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            cache_enabled: true,
        }
    }
}

impl IndexOptions {
    /// Sets the TTL.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Enables or disables caching.
    #[must_use]
    pub const fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }
}

/// Counters exposed by [`DocIndexCache::stats`].
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct IndexCacheStats {
    /// Roots currently cached.
    pub entries: usize,
    /// Fresh-entry hits.
    pub hits: u64,
    /// Misses (expired, absent, or cache disabled).
    pub misses: u64,
}

struct Entry {
    index: Arc<DocIndex>,
    expires_at: Instant,
}

type Slot = Arc<tokio::sync::Mutex<Option<Entry>>>;

/// Process-wide cache of parsed corpus indexes, keyed by root.
///
/// Refresh on miss is exclusive per root; readers of other roots and of a
/// fresh entry never wait on a rebuild.
pub struct DocIndexCache {
    roots: Mutex<HashMap<PathBuf, Slot>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DocIndexCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            roots: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the cached index for `root`, rebuilding it when absent,
    /// expired, or caching is disabled.
    ///
    /// # Errors
    ///
    /// Propagates parse and fingerprint errors from the rebuild.
    pub async fn get(&self, root: &Path, options: IndexOptions) -> Result<Arc<DocIndex>> {
        let slot = self.slot(root);
        let mut guard = slot.lock().await;

        if options.cache_enabled
            && let Some(entry) = guard.as_ref()
            && Instant::now() < entry.expires_at
        {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(&entry.index));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let owned_root = root.to_path_buf();
        let built = tokio::task::spawn_blocking(move || build_index(&owned_root))
            .await
            .map_err(|_| Error::Cancelled)??;
        let index = Arc::new(built);
        debug!(
            root = %root.display(),
            fingerprint = %index.fingerprint,
            sections = index.sections.len(),
            "rebuilt doc index"
        );

        if options.cache_enabled {
            *guard = Some(Entry {
                index: Arc::clone(&index),
                expires_at: Instant::now() + options.ttl,
            });
        } else {
            *guard = None;
        }
        Ok(index)
    }

    /// Drops the cached entry for `root`. The next `get` rebuilds.
    pub fn invalidate(&self, root: &Path) {
        if let Ok(mut roots) = self.roots.lock() {
            roots.remove(root);
        }
    }

    /// Drops every cached entry.
    pub fn invalidate_all(&self) {
        if let Ok(mut roots) = self.roots.lock() {
            roots.clear();
        }
    }

    /// Returns cache counters.
    pub fn stats(&self) -> IndexCacheStats {
        let entries = self.roots.lock().map_or(0, |roots| {
            roots
                .values()
                .filter(|slot| {
                    slot.try_lock()
                        .map(|guard| guard.is_some())
                        .unwrap_or(true)
                })
                .count()
        });
        IndexCacheStats {
            entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Spawns the background sweep task removing expired entries every
    /// minute. Abort the returned handle to stop it.
    #[must_use]
    pub fn spawn_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        let cache = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                cache.sweep();
            }
        })
    }

    /// Removes entries whose TTL has elapsed.
    fn sweep(&self) {
        let slots: Vec<Slot> = self
            .roots
            .lock()
            .map(|roots| roots.values().cloned().collect())
            .unwrap_or_default();
        let now = Instant::now();
        for slot in slots {
            // Skip slots busy with a rebuild; the next sweep catches them.
            if let Ok(mut guard) = slot.try_lock()
                && guard.as_ref().is_some_and(|e| now >= e.expires_at)
            {
                *guard = None;
            }
        }
    }

    fn slot(&self, root: &Path) -> Slot {
        self.roots.lock().map_or_else(
            |_| Arc::new(tokio::sync::Mutex::new(None)),
            |mut roots| Arc::clone(roots.entry(root.to_path_buf()).or_default()),
        )
    }
}

impl Default for DocIndexCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses the corpus and computes its fingerprint in one discovery pass.
fn build_index(root: &Path) -> Result<DocIndex> {
    let files = parser::discover_files(root)?;
    let fingerprint = fingerprint(root, &files);
    let sections: Vec<Section> = parser::parse_files(root, &files)?;
    Ok(DocIndex {
        sections,
        fingerprint,
        built_at: Instant::now(),
        file_count: files.len(),
    })
}

/// Digest of the sorted (absolute path, mtime ms) pairs plus the root path.
///
/// Any add, remove, rename, or modification of a selected file under the
/// root changes the result.
fn fingerprint(root: &Path, files: &[PathBuf]) -> String {
    let mut pairs: Vec<(String, u128)> = files
        .iter()
        .map(|path| (path.to_string_lossy().into_owned(), mtime_millis(path)))
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = Sha256::new();
    for (path, mtime) in pairs {
        hasher.update(path.as_bytes());
        hasher.update(mtime.to_string().as_bytes());
    }
    hasher.update(root.to_string_lossy().as_bytes());
    hex_digest(&hasher.finalize())
}

fn mtime_millis(path: &Path) -> u128 {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_or_else(
            |err| {
                warn!(path = %path.display(), error = %err, "missing mtime, using zero");
                0
            },
            |mtime| {
                mtime
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_millis())
                    .unwrap_or(0)
            },
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn corpus(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().expect("tempdir");
        for (name, content) in files {
            fs::write(dir.path().join(name), content).expect("write fixture");
        }
        dir
    }

    #[tokio::test]
    async fn test_get_caches_by_fingerprint() {
        let dir = corpus(&[("R1-A.md", "# H\nX\n")]);
        let cache = DocIndexCache::new();
        let first = cache
            .get(dir.path(), IndexOptions::default())
            .await
            .expect("get");
        let second = cache
            .get(dir.path(), IndexOptions::default())
            .await
            .expect("get");
        assert_eq!(first.fingerprint, second.fingerprint);
        assert!(Arc::ptr_eq(&first, &second));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_fresh_build() {
        let dir = corpus(&[("R1-A.md", "# H\nX\n")]);
        let cache = DocIndexCache::new();
        let first = cache
            .get(dir.path(), IndexOptions::default())
            .await
            .expect("get");
        cache.invalidate(dir.path());
        let second = cache
            .get(dir.path(), IndexOptions::default())
            .await
            .expect("get");
        assert!(second.built_at > first.built_at);
    }

    #[tokio::test]
    async fn test_mtime_change_alters_fingerprint() {
        let dir = corpus(&[("R1-A.md", "# H\nX\n")]);
        let cache = DocIndexCache::new();
        let first = cache
            .get(dir.path(), IndexOptions::default())
            .await
            .expect("get");

        let path = dir.path().join("R1-A.md");
        fs::write(&path, "# H\nY\n").expect("rewrite");
        let file = fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .expect("open");
        file.set_modified(std::time::SystemTime::now() + Duration::from_secs(5))
            .expect("set mtime");

        cache.invalidate(dir.path());
        let second = cache
            .get(dir.path(), IndexOptions::default())
            .await
            .expect("get");
        assert_ne!(first.fingerprint, second.fingerprint);
        assert_eq!(second.sections[0].content, "Y");
    }

    #[tokio::test]
    async fn test_file_add_and_remove_alter_fingerprint() {
        let dir = corpus(&[("R1-A.md", "# H\nX\n")]);
        let options = IndexOptions::default().with_cache(false);
        let cache = DocIndexCache::new();
        let base = cache.get(dir.path(), options).await.expect("get");

        fs::write(dir.path().join("R2-B.md"), "# B\nY\n").expect("write");
        let added = cache.get(dir.path(), options).await.expect("get");
        assert_ne!(base.fingerprint, added.fingerprint);
        assert_eq!(added.file_count, 2);

        fs::remove_file(dir.path().join("R2-B.md")).expect("remove");
        let removed = cache.get(dir.path(), options).await.expect("get");
        assert_ne!(added.fingerprint, removed.fingerprint);
    }

    #[tokio::test]
    async fn test_ttl_expiry_rebuilds() {
        let dir = corpus(&[("R1-A.md", "# H\nX\n")]);
        let cache = DocIndexCache::new();
        let options = IndexOptions::default().with_ttl(Duration::from_millis(10));
        let first = cache.get(dir.path(), options).await.expect("get");
        tokio::time::sleep(Duration::from_millis(30)).await;
        let second = cache.get(dir.path(), options).await.expect("get");
        assert!(second.built_at > first.built_at);
        assert_eq!(cache.stats().misses, 2);
    }

    #[tokio::test]
    async fn test_sweep_removes_expired_entries() {
        let dir = corpus(&[("R1-A.md", "# H\nX\n")]);
        let cache = DocIndexCache::new();
        let options = IndexOptions::default().with_ttl(Duration::from_millis(1));
        cache.get(dir.path(), options).await.expect("get");
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.sweep();
        assert_eq!(cache.stats().entries, 0);
    }
}
