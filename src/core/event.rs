//! Typed lifecycle events for corpus writes and watch notifications.
//!
//! Producers send [`DocEvent`] values over a broadcast bus; consumers
//! subscribe and range over their receiver. Document events are always
//! emitted before the matching `ReindexTriggered`.

use std::path::PathBuf;
use tokio::sync::broadcast;

/// Default capacity of the event bus ring buffer.
const EVENT_BUS_CAPACITY: usize = 64;

/// A lifecycle event emitted by the update agent or the file watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocEvent {
    /// A document was created.
    Created {
        /// Path of the new document.
        path: PathBuf,
    },
    /// A document was updated in place.
    Updated {
        /// Path of the changed document.
        path: PathBuf,
    },
    /// A document was removed.
    Removed {
        /// Path of the removed document.
        path: PathBuf,
    },
    /// A document was (re)indexed after a watch notification.
    Indexed {
        /// Path of the indexed document.
        path: PathBuf,
    },
    /// Caches for a root were invalidated and a rebuild is due.
    ReindexTriggered {
        /// Corpus root whose caches were invalidated.
        root: PathBuf,
    },
    /// The watcher hit a non-fatal error.
    WatchError {
        /// Error text.
        message: String,
    },
}

impl DocEvent {
    /// Wire name of the event kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Created { .. } => "doc_created",
            Self::Updated { .. } => "doc_updated",
            Self::Removed { .. } => "doc_removed",
            Self::Indexed { .. } => "doc_indexed",
            Self::ReindexTriggered { .. } => "reindex_triggered",
            Self::WatchError { .. } => "error",
        }
    }
}

/// Broadcast bus for [`DocEvent`] values.
///
/// Cloning the bus shares the underlying channel. Sending never fails;
/// events emitted with no subscribers are dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DocEvent>,
}

impl EventBus {
    /// Creates a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { sender }
    }

    /// Emits an event to all current subscribers.
    pub fn emit(&self, event: DocEvent) {
        // A send error only means nobody is listening right now.
        let _ = self.sender.send(event);
    }

    /// Subscribes to events emitted after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DocEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
