//! Keyed LRU+TTL query cache with request deduplication.
//!
//! Concurrent `get` calls for the same serialized key share a single
//! execution of the fetch: the first caller spawns it, everyone else awaits
//! the same result over a watch channel. The fetch runs outside the cache
//! lock; on success the result is stored, on failure nothing is cached and
//! every waiter observes the error. Abandoning waiters never cancels the
//! elected fetch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::error;

use crate::error::{Error, Result, SearchError};
use crate::search::SectionHit;

/// Default maximum number of cached entries.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Default per-entry TTL: five minutes.
pub const DEFAULT_QUERY_TTL: Duration = Duration::from_millis(300_000);

/// Shared, immutable query result.
pub type SharedHits = Arc<Vec<SectionHit>>;

type FetchResult = std::result::Result<SharedHits, Arc<Error>>;
type InflightRx = watch::Receiver<Option<FetchResult>>;

/// Cache key: corpus fingerprint, normalized query, and filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryKey {
    /// Corpus fingerprint the result is valid for.
    pub fingerprint: String,
    /// Raw query text; lowercased during serialization.
    pub query: String,
    /// Release filter.
    pub release: Option<String>,
    /// Service filter.
    pub service: Option<String>,
    /// Document-type filter.
    pub doc_types: Option<Vec<String>>,
    /// Result limit.
    pub max_results: Option<usize>,
}

impl QueryKey {
    /// Serializes the key, omitting absent fields.
    #[must_use]
    pub fn serialize(&self) -> String {
        let mut parts = vec![self.fingerprint.clone(), self.query.to_lowercase()];
        if let Some(release) = &self.release {
            parts.push(format!("r:{release}"));
        }
        if let Some(service) = &self.service {
            parts.push(format!("s:{service}"));
        }
        if let Some(doc_types) = &self.doc_types {
            let mut sorted = doc_types.clone();
            sorted.sort();
            parts.push(format!("dt:{}", sorted.join(",")));
        }
        if let Some(max_results) = self.max_results {
            parts.push(format!("max:{max_results}"));
        }
        parts.join("|")
    }
}

/// Counters exposed by [`QueryCache::stats`].
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct QueryCacheStats {
    /// Fresh-entry hits.
    pub hits: u64,
    /// Misses that elected a fetch.
    pub misses: u64,
    /// Calls that joined an in-flight fetch.
    #[serde(rename = "inflightHits")]
    pub inflight_hits: u64,
    /// `hits / (hits + misses + inflight_hits)`, or 0 with no traffic.
    #[serde(rename = "hitRate")]
    pub hit_rate: f64,
}

struct CacheEntry {
    hits: SharedHits,
    expires_at: Instant,
    last_used: u64,
}

struct Inner {
    entries: HashMap<String, CacheEntry>,
    inflight: HashMap<String, InflightRx>,
    tick: u64,
}

enum Route {
    Cached(SharedHits),
    Join(InflightRx),
    Lead(watch::Sender<Option<FetchResult>>, InflightRx),
}

/// Bounded LRU+TTL cache of query results with singleflight semantics.
///
/// Internally reference-counted: the elected fetch runs on a detached task
/// that settles the shared state when it completes.
pub struct QueryCache {
    shared: Arc<CacheShared>,
}

struct CacheShared {
    inner: Mutex<Inner>,
    capacity: usize,
    ttl: Duration,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
    inflight_hit_count: AtomicU64,
}

impl QueryCache {
    /// Creates a cache with the default capacity and TTL.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_CAPACITY, DEFAULT_QUERY_TTL)
    }

    /// Creates a cache with explicit capacity and TTL.
    #[must_use]
    pub fn with_limits(capacity: usize, ttl: Duration) -> Self {
        Self {
            shared: Arc::new(CacheShared {
                inner: Mutex::new(Inner {
                    entries: HashMap::new(),
                    inflight: HashMap::new(),
                    tick: 0,
                }),
                capacity,
                ttl,
                hit_count: AtomicU64::new(0),
                miss_count: AtomicU64::new(0),
                inflight_hit_count: AtomicU64::new(0),
            }),
        }
    }

    /// Returns the cached result for `key`, joining an in-flight fetch or
    /// electing `fetch` to run when necessary.
    ///
    /// # Errors
    ///
    /// Returns the fetch error (as [`SearchError::FetchFailed`] for every
    /// waiter) when the elected fetch fails; nothing is cached in that case.
    pub async fn get<F>(&self, key: &QueryKey, fetch: F) -> Result<SharedHits>
    where
        F: Future<Output = Result<Vec<SectionHit>>> + Send + 'static,
    {
        let serialized = key.serialize();
        let route = self.shared.route(&serialized);

        match route {
            Route::Cached(hits) => Ok(hits),
            Route::Join(rx) => await_fetch(rx).await,
            Route::Lead(tx, rx) => {
                let shared = Arc::clone(&self.shared);
                let fetch_key = serialized;
                // Detached so abandoning waiters never cancel the fetch.
                tokio::spawn(async move {
                    let result: FetchResult = match fetch.await {
                        Ok(hits) => Ok(Arc::new(hits)),
                        Err(err) => {
                            error!(key = %fetch_key, error = %err, "query fetch failed");
                            Err(Arc::new(err))
                        }
                    };
                    shared.settle(&fetch_key, &result);
                    let _ = tx.send(Some(result));
                });
                await_fetch(rx).await
            }
        }
    }

    /// Removes every key belonging to the given corpus fingerprint.
    pub fn invalidate_fingerprint(&self, fingerprint: &str) {
        let prefix = format!("{fingerprint}|");
        if let Ok(mut inner) = self.shared.inner.lock() {
            inner.entries.retain(|key, _| !key.starts_with(&prefix));
        }
    }

    /// Empties the cache and forgets in-flight registrations.
    pub fn clear(&self) {
        if let Ok(mut inner) = self.shared.inner.lock() {
            inner.entries.clear();
            inner.inflight.clear();
        }
    }

    /// Returns cache counters.
    pub fn stats(&self) -> QueryCacheStats {
        let hits = self.shared.hit_count.load(Ordering::Relaxed);
        let misses = self.shared.miss_count.load(Ordering::Relaxed);
        let inflight_hits = self.shared.inflight_hit_count.load(Ordering::Relaxed);
        let total = hits + misses + inflight_hits;
        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        };
        QueryCacheStats {
            hits,
            misses,
            inflight_hits,
            hit_rate,
        }
    }
}

impl CacheShared {
    /// Single insert-or-join critical section.
    fn route(&self, serialized: &str) -> Route {
        let Ok(mut inner) = self.inner.lock() else {
            let (tx, rx) = watch::channel(None);
            return Route::Lead(tx, rx);
        };
        inner.tick += 1;
        let tick = inner.tick;

        match inner.entries.get_mut(serialized) {
            Some(entry) if Instant::now() < entry.expires_at => {
                entry.last_used = tick;
                self.hit_count.fetch_add(1, Ordering::Relaxed);
                return Route::Cached(Arc::clone(&entry.hits));
            }
            Some(_) => {
                inner.entries.remove(serialized);
            }
            None => {}
        }

        if let Some(rx) = inner.inflight.get(serialized) {
            self.inflight_hit_count.fetch_add(1, Ordering::Relaxed);
            return Route::Join(rx.clone());
        }

        self.miss_count.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(None);
        inner.inflight.insert(serialized.to_string(), rx.clone());
        Route::Lead(tx, rx)
    }

    /// Removes the in-flight registration and stores a successful result.
    fn settle(&self, serialized: &str, result: &FetchResult) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        inner.inflight.remove(serialized);
        if let Ok(hits) = result {
            inner.tick += 1;
            let tick = inner.tick;
            inner.entries.insert(
                serialized.to_string(),
                CacheEntry {
                    hits: Arc::clone(hits),
                    expires_at: Instant::now() + self.ttl,
                    last_used: tick,
                },
            );
            while inner.entries.len() > self.capacity {
                let Some(oldest) = inner
                    .entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.last_used)
                    .map(|(key, _)| key.clone())
                else {
                    break;
                };
                inner.entries.remove(&oldest);
            }
        }
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for an in-flight fetch to resolve.
async fn await_fetch(mut rx: InflightRx) -> Result<SharedHits> {
    let settled = rx
        .wait_for(Option::is_some)
        .await
        .map_err(|_| {
            Error::Search(SearchError::FetchFailed {
                message: "fetch task dropped before settling".to_string(),
            })
        })?
        .clone();
    match settled {
        Some(Ok(hits)) => Ok(hits),
        Some(Err(err)) => Err(Error::Search(SearchError::FetchFailed {
            message: err.to_string(),
        })),
        None => unreachable!("wait_for guarantees a settled value"),
    }
}
