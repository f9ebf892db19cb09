//! Debounced corpus file watching.
//!
//! Observes the corpus root recursively for `.md` changes, debounces each
//! path, and on the quiet edge invalidates the section and fact caches,
//! runs the optional reindex callback, and emits the matching typed event.
//! Watcher errors become `error` events and never terminate the process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::core::{DocEvent, EventBus};
use crate::error::{Error, Result};
use crate::facts::FactIndexCache;
use crate::index::DocIndexCache;

/// Default debounce window per path.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

/// Directory names ignored by default.
const IGNORED_DIRS: [&str; 3] = ["node_modules", ".git", "build"];

/// Async callback invoked after caches are invalidated for a change.
pub type ReindexCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

type TimerMap = Arc<Mutex<HashMap<PathBuf, JoinHandle<()>>>>;

/// Everything a fired debounce timer needs, shared across tasks.
struct FireContext {
    root: PathBuf,
    debounce: Duration,
    index_cache: Arc<DocIndexCache>,
    fact_cache: Arc<FactIndexCache>,
    events: EventBus,
    on_reindex: Option<ReindexCallback>,
}

impl FireContext {
    /// Invalidates caches, runs the callback, and emits the typed event.
    async fn fire(&self, path: PathBuf, kind: ChangeKind) {
        self.index_cache.invalidate(&self.root);
        self.fact_cache.invalidate(&self.root);
        if let Some(callback) = &self.on_reindex {
            callback().await;
        }
        let event = match kind {
            ChangeKind::Added => DocEvent::Indexed { path },
            ChangeKind::Changed => DocEvent::Updated { path },
            ChangeKind::Removed => DocEvent::Removed { path },
        };
        self.events.emit(event);
    }
}

struct Running {
    // Dropping the watcher stops the OS-level notifications.
    _watcher: RecommendedWatcher,
    dispatcher: JoinHandle<()>,
    timers: TimerMap,
}

/// Watches one corpus root and keeps its caches fresh.
pub struct DocWatcher {
    root: PathBuf,
    debounce: Duration,
    index_cache: Arc<DocIndexCache>,
    fact_cache: Arc<FactIndexCache>,
    events: EventBus,
    on_reindex: Option<ReindexCallback>,
    running: Mutex<Option<Running>>,
}

impl DocWatcher {
    /// Creates a watcher for `root` with the default debounce.
    #[must_use]
    pub fn new(
        root: impl Into<PathBuf>,
        index_cache: Arc<DocIndexCache>,
        fact_cache: Arc<FactIndexCache>,
        events: EventBus,
    ) -> Self {
        Self {
            root: root.into(),
            debounce: DEFAULT_DEBOUNCE,
            index_cache,
            fact_cache,
            events,
            on_reindex: None,
            running: Mutex::new(None),
        }
    }

    /// Overrides the debounce window.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Installs a callback run after each invalidation.
    #[must_use]
    pub fn with_on_reindex(mut self, callback: ReindexCallback) -> Self {
        self.on_reindex = Some(callback);
        self
    }

    /// Starts watching. Idempotent: a second call while running is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error when the OS watcher cannot be created or the root
    /// cannot be watched.
    pub fn start(&self) -> Result<()> {
        let mut running = self.running.lock().map_err(|_| Error::Config {
            message: "watcher state poisoned".to_string(),
        })?;
        if running.is_some() {
            return Ok(());
        }

        let (tx, rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<Event>| {
                let _ = tx.send(result);
            },
            notify::Config::default(),
        )
        .map_err(|e| Error::Config {
            message: format!("cannot create file watcher: {e}"),
        })?;
        watcher
            .watch(&self.root, RecursiveMode::Recursive)
            .map_err(|e| Error::Config {
                message: format!("cannot watch {}: {e}", self.root.display()),
            })?;
        debug!(root = %self.root.display(), "watching corpus");

        let context = Arc::new(FireContext {
            root: self.root.clone(),
            debounce: self.debounce,
            index_cache: Arc::clone(&self.index_cache),
            fact_cache: Arc::clone(&self.fact_cache),
            events: self.events.clone(),
            on_reindex: self.on_reindex.clone(),
        });
        let timers: TimerMap = Arc::new(Mutex::new(HashMap::new()));
        let dispatcher = tokio::spawn(dispatch_loop(rx, context, Arc::clone(&timers)));

        *running = Some(Running {
            _watcher: watcher,
            dispatcher,
            timers,
        });
        Ok(())
    }

    /// Stops watching, cancelling every pending debounce timer.
    pub fn stop(&self) {
        let Ok(mut running) = self.running.lock() else {
            return;
        };
        if let Some(state) = running.take() {
            state.dispatcher.abort();
            if let Ok(mut timers) = state.timers.lock() {
                for (_, handle) in timers.drain() {
                    handle.abort();
                }
            }
            debug!(root = %self.root.display(), "stopped watching corpus");
        }
    }

    /// Event bus this watcher emits on.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }
}

impl Drop for DocWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Clone, Copy)]
enum ChangeKind {
    Added,
    Changed,
    Removed,
}

/// Receives raw notify events, filters them, and manages per-path timers.
async fn dispatch_loop(
    mut rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    context: Arc<FireContext>,
    timers: TimerMap,
) {
    while let Some(result) = rx.recv().await {
        let event = match result {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, "watch error");
                context.events.emit(DocEvent::WatchError {
                    message: err.to_string(),
                });
                continue;
            }
        };
        let kind = match event.kind {
            EventKind::Create(_) => ChangeKind::Added,
            EventKind::Modify(_) => ChangeKind::Changed,
            EventKind::Remove(_) => ChangeKind::Removed,
            _ => continue,
        };
        for path in event.paths {
            if !is_watched_path(&path) {
                continue;
            }
            schedule(&context, &timers, path, kind);
        }
    }
}

/// Starts or resets the debounce timer for one path.
fn schedule(context: &Arc<FireContext>, timers: &TimerMap, path: PathBuf, kind: ChangeKind) {
    let Ok(mut map) = timers.lock() else {
        return;
    };
    if let Some(previous) = map.remove(&path) {
        previous.abort();
    }
    let context = Arc::clone(context);
    let timers_for_task = Arc::clone(timers);
    let task_path = path.clone();
    let handle = tokio::spawn(async move {
        tokio::time::sleep(context.debounce).await;
        if let Ok(mut map) = timers_for_task.lock() {
            map.remove(&task_path);
        }
        context.fire(task_path, kind).await;
    });
    map.insert(path, handle);
}

/// `.md` files outside the default-ignored directories.
fn is_watched_path(path: &Path) -> bool {
    if path.extension().and_then(|e| e.to_str()) != Some("md") {
        return false;
    }
    !path.components().any(|component| {
        component
            .as_os_str()
            .to_str()
            .is_some_and(|name| IGNORED_DIRS.contains(&name))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexOptions;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn context_for(root: &Path, debounce_ms: u64) -> Arc<FireContext> {
        Arc::new(FireContext {
            root: root.to_path_buf(),
            debounce: Duration::from_millis(debounce_ms),
            index_cache: Arc::new(DocIndexCache::new()),
            fact_cache: Arc::new(FactIndexCache::new()),
            events: EventBus::new(),
            on_reindex: None,
        })
    }

    #[test]
    fn test_watched_path_filter() {
        assert!(is_watched_path(Path::new("/docs/R1-NOTES.md")));
        assert!(!is_watched_path(Path::new("/docs/R1-NOTES.txt")));
        assert!(!is_watched_path(Path::new("/docs/node_modules/R1-A.md")));
        assert!(!is_watched_path(Path::new("/docs/.git/R1-A.md")));
        assert!(!is_watched_path(Path::new("/docs/build/R1-A.md")));
    }

    #[tokio::test]
    async fn test_debounce_collapses_bursts() {
        let dir = TempDir::new().expect("tempdir");
        let counter = Arc::new(AtomicUsize::new(0));
        let callback_counter = Arc::clone(&counter);
        let mut context = context_for(dir.path(), 40);
        Arc::get_mut(&mut context).expect("unshared").on_reindex =
            Some(Arc::new(move || {
                let counter = Arc::clone(&callback_counter);
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            }));
        let mut events = context.events.subscribe();
        let timers: TimerMap = Arc::new(Mutex::new(HashMap::new()));

        // Three rapid events on the same path collapse into one firing.
        let path = dir.path().join("R1-NOTES.md");
        for _ in 0..3 {
            schedule(&context, &timers, path.clone(), ChangeKind::Changed);
        }
        let event = events.recv().await.expect("event");
        assert_eq!(event.kind(), "doc_updated");
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fire_invalidates_index_cache() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::write(dir.path().join("R1-A.md"), "# H\nX\n").expect("write");

        let context = context_for(dir.path(), 10);
        let before = context
            .index_cache
            .get(dir.path(), IndexOptions::default())
            .await
            .expect("get");
        context
            .fire(dir.path().join("R1-A.md"), ChangeKind::Added)
            .await;
        let after = context
            .index_cache
            .get(dir.path(), IndexOptions::default())
            .await
            .expect("get");
        assert!(after.built_at > before.built_at);
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let dir = TempDir::new().expect("tempdir");
        let watcher = DocWatcher::new(
            dir.path(),
            Arc::new(DocIndexCache::new()),
            Arc::new(FactIndexCache::new()),
            EventBus::new(),
        )
        .with_debounce(Duration::from_millis(20));
        watcher.start().expect("start");
        watcher.start().expect("idempotent start");
        watcher.stop();
        watcher.stop();
    }

    #[tokio::test]
    async fn test_live_change_emits_event() {
        let dir = TempDir::new().expect("tempdir");
        let watcher = DocWatcher::new(
            dir.path(),
            Arc::new(DocIndexCache::new()),
            Arc::new(FactIndexCache::new()),
            EventBus::new(),
        )
        .with_debounce(Duration::from_millis(30));
        let mut events = watcher.events().subscribe();
        watcher.start().expect("start");

        // Give the OS watcher a moment to arm before writing.
        tokio::time::sleep(Duration::from_millis(150)).await;
        std::fs::write(dir.path().join("R1-NEW.md"), "# H\nbody\n").expect("write");

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timeout waiting for watch event")
            .expect("event");
        assert!(matches!(
            event,
            DocEvent::Indexed { .. } | DocEvent::Updated { .. }
        ));
        watcher.stop();
    }
}
