//! Backend Events
//!
//! Out-of-band notifications pushed from the backend to the UI side.
//! Every event is tagged with the session or watcher that produced it and
//! is fanned out through a single bus to one bounded queue per subscriber;
//! each transport decides which events a given consumer is interested in.

use log::{trace, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Event name for streamed terminal output
pub const TERMINAL_DATA: &str = "terminal:data";
/// Event name for terminal process termination
pub const TERMINAL_EXIT: &str = "terminal:exit";
/// Event name for filesystem watch notifications
pub const WATCH_EVENT: &str = "watch:event";

/// Chunk of output read from a terminal's stdout or stderr
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalDataPayload {
    pub id: String,
    pub data: String,
}

/// Terminal process has exited and its session is gone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalExitPayload {
    pub id: String,
}

/// Kind of filesystem change reported by a watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WatchEventType {
    /// File added
    Add,
    /// File content or attributes changed
    Change,
    /// File removed
    Unlink,
    /// Directory added
    AddDir,
    /// Directory removed
    UnlinkDir,
}

impl std::fmt::Display for WatchEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Change => write!(f, "change"),
            Self::Unlink => write!(f, "unlink"),
            Self::AddDir => write!(f, "addDir"),
            Self::UnlinkDir => write!(f, "unlinkDir"),
        }
    }
}

/// Filesystem change observed under a watched root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchEventPayload {
    pub watcher_id: String,
    pub event_type: WatchEventType,
    pub path: String,
}

/// Event kinds a consumer can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "terminal:data")]
    TerminalData,
    #[serde(rename = "terminal:exit")]
    TerminalExit,
    #[serde(rename = "watch:event")]
    WatchEvent,
}

impl EventKind {
    /// All event kinds, in wire order
    pub const ALL: [EventKind; 3] = [Self::TerminalData, Self::TerminalExit, Self::WatchEvent];

    /// Wire name of this event kind
    pub fn name(&self) -> &'static str {
        match self {
            Self::TerminalData => TERMINAL_DATA,
            Self::TerminalExit => TERMINAL_EXIT,
            Self::WatchEvent => WATCH_EVENT,
        }
    }
}

/// Events pushed to the UI without a matching request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum BackendEvent {
    #[serde(rename = "terminal:data")]
    TerminalData(TerminalDataPayload),

    #[serde(rename = "terminal:exit")]
    TerminalExit(TerminalExitPayload),

    #[serde(rename = "watch:event")]
    WatchEvent(WatchEventPayload),
}

impl BackendEvent {
    pub fn terminal_data(id: impl Into<String>, data: impl Into<String>) -> Self {
        Self::TerminalData(TerminalDataPayload {
            id: id.into(),
            data: data.into(),
        })
    }

    pub fn terminal_exit(id: impl Into<String>) -> Self {
        Self::TerminalExit(TerminalExitPayload { id: id.into() })
    }

    pub fn watch(
        watcher_id: impl Into<String>,
        event_type: WatchEventType,
        path: impl Into<String>,
    ) -> Self {
        Self::WatchEvent(WatchEventPayload {
            watcher_id: watcher_id.into(),
            event_type,
            path: path.into(),
        })
    }

    /// Get the kind of this event
    pub fn kind(&self) -> EventKind {
        match self {
            Self::TerminalData(_) => EventKind::TerminalData,
            Self::TerminalExit(_) => EventKind::TerminalExit,
            Self::WatchEvent(_) => EventKind::WatchEvent,
        }
    }

    /// Get the wire event name for this event
    pub fn event_name(&self) -> &'static str {
        self.kind().name()
    }

    /// Session or watcher identifier the event is tagged with
    pub fn source_id(&self) -> &str {
        match self {
            Self::TerminalData(p) => &p.id,
            Self::TerminalExit(p) => &p.id,
            Self::WatchEvent(p) => &p.watcher_id,
        }
    }
}

/// Receiving end of one subscription
pub type EventReceiver = mpsc::Receiver<BackendEvent>;

/// Shared event bus every producer publishes into.
///
/// `publish` waits for room in every subscriber queue, so a slow consumer
/// slows the producer down instead of losing events. `try_publish` never
/// waits and drops the event for subscribers whose queue is full.
#[derive(Debug, Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<BackendEvent>>>>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus whose subscriber queues hold up to `capacity` events
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            capacity: capacity.max(1),
        }
    }

    /// Deliver an event to all current subscribers, waiting while a queue
    /// is full. Returns the number of subscribers reached.
    pub async fn publish(&self, event: BackendEvent) -> usize {
        let subscribers = self.subscribers.lock().clone();
        if subscribers.is_empty() {
            trace!("No subscribers for {} ({})", event.event_name(), event.source_id());
            return 0;
        }

        let mut delivered = 0;
        for tx in &subscribers {
            if tx.send(event.clone()).await.is_ok() {
                delivered += 1;
            }
        }

        if delivered < subscribers.len() {
            self.prune();
        }
        delivered
    }

    /// Deliver an event without waiting
    pub fn try_publish(&self, event: BackendEvent) -> usize {
        let mut subscribers = self.subscribers.lock();
        let mut delivered = 0;

        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    "Subscriber queue full, dropped {} ({})",
                    event.event_name(),
                    event.source_id()
                );
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });

        delivered
    }

    /// Subscribe to every event published from now on
    pub fn subscribe(&self) -> EventReceiver {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.subscribers.lock().push(tx);
        rx
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.prune();
        self.subscribers.lock().len()
    }

    fn prune(&self) {
        self.subscribers.lock().retain(|tx| !tx.is_closed());
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
