//! Watch Manager
//!
//! Watch registry backed by DashMap. Every native watcher sends its raw
//! events, tagged with the watcher id, into one shared channel; a single
//! dispatcher task looks the id up and publishes translated events while
//! holding the map entry, so removing the entry is the cut-off point for
//! delivery.

use dashmap::DashMap;
use log::{debug, info, trace, warn};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use super::translate::DirTracker;
use crate::events::{BackendEvent, EventBus};

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Cannot watch {}: {}", .path.display(), .source)]
    Inaccessible {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot watch {}: not a directory", .path.display())]
    NotADirectory { path: PathBuf },

    #[error("Failed to start watching {}: {}", .path.display(), .source)]
    Notify {
        path: PathBuf,
        source: notify::Error,
    },

    #[error("Watch setup task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<WatchError> for String {
    fn from(err: WatchError) -> String {
        err.to_string()
    }
}

/// Raw notification tagged with the watcher that produced it
struct RawWatchEvent {
    watcher_id: String,
    result: notify::Result<notify::Event>,
}

/// One active watch
struct ActiveWatch {
    root: PathBuf,
    tracker: Mutex<DirTracker>,
    /// Dropping the watcher releases the native watch
    _watcher: Mutex<RecommendedWatcher>,
}

/// Watch Manager - owns every directory watch
pub struct WatchManager {
    /// Active watches (watcher_id -> ActiveWatch)
    watches: Arc<DashMap<String, ActiveWatch>>,
    /// Shared channel into the dispatcher
    raw_tx: mpsc::UnboundedSender<RawWatchEvent>,
}

impl WatchManager {
    /// Create the manager and start its dispatcher task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(bus: EventBus) -> Self {
        let watches = Arc::new(DashMap::new());
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();

        tokio::spawn(dispatch_events(Arc::clone(&watches), raw_rx, bus));

        Self { watches, raw_tx }
    }

    /// Start a recursive watch on `path` and return its new watcher id.
    ///
    /// Entries already present are not reported; symbolic links are not
    /// followed.
    pub async fn watch_directory(&self, path: impl AsRef<Path>) -> Result<String, WatchError> {
        let path = path.as_ref().to_path_buf();

        let root = tokio::fs::canonicalize(&path)
            .await
            .map_err(|source| WatchError::Inaccessible {
                path: path.clone(),
                source,
            })?;
        if !root.is_dir() {
            return Err(WatchError::NotADirectory { path });
        }

        let watcher_id = uuid::Uuid::new_v4().to_string();
        let raw_tx = self.raw_tx.clone();
        let tagged_id = watcher_id.clone();
        let setup_root = root.clone();

        // native recursive watch setup and the directory scan both walk the tree
        let (watcher, tracker) = tokio::task::spawn_blocking(move || {
            let mut watcher = notify::recommended_watcher(move |result| {
                let _ = raw_tx.send(RawWatchEvent {
                    watcher_id: tagged_id.clone(),
                    result,
                });
            })
            .map_err(|source| WatchError::Notify {
                path: setup_root.clone(),
                source,
            })?;

            watcher
                .watch(&setup_root, RecursiveMode::Recursive)
                .map_err(|source| WatchError::Notify {
                    path: setup_root.clone(),
                    source,
                })?;

            Ok::<_, WatchError>((watcher, DirTracker::scan(&setup_root)))
        })
        .await??;

        self.watches.insert(
            watcher_id.clone(),
            ActiveWatch {
                root: root.clone(),
                tracker: Mutex::new(tracker),
                _watcher: Mutex::new(watcher),
            },
        );

        info!("Watching {} as {}", root.display(), watcher_id);
        Ok(watcher_id)
    }

    /// Stop a watch. Unknown ids are ignored; returns whether one was removed.
    pub fn stop_watching(&self, watcher_id: &str) -> bool {
        // the entry leaves the map before the native watcher is dropped
        match self.watches.remove(watcher_id) {
            Some((_, watch)) => {
                info!("Stopped watching {} ({})", watch.root.display(), watcher_id);
                drop(watch);
                true
            }
            None => {
                debug!("Stop requested for unknown watcher {}", watcher_id);
                false
            }
        }
    }

    /// Root path of an active watch
    pub fn root(&self, watcher_id: &str) -> Option<PathBuf> {
        self.watches.get(watcher_id).map(|w| w.root.clone())
    }

    /// Check if a watch is active
    pub fn is_watching(&self, watcher_id: &str) -> bool {
        self.watches.contains_key(watcher_id)
    }

    /// Number of active watches
    pub fn count(&self) -> usize {
        self.watches.len()
    }

    /// Stop every watch - for cleanup on app exit
    pub fn stop_all(&self) {
        let ids: Vec<String> = self.watches.iter().map(|w| w.key().clone()).collect();
        for id in ids {
            self.stop_watching(&id);
        }
    }
}

async fn dispatch_events(
    watches: Arc<DashMap<String, ActiveWatch>>,
    mut raw_rx: mpsc::UnboundedReceiver<RawWatchEvent>,
    bus: EventBus,
) {
    while let Some(raw) = raw_rx.recv().await {
        let Some(watch) = watches.get(&raw.watcher_id) else {
            trace!("Dropping event for removed watcher {}", raw.watcher_id);
            continue;
        };

        match raw.result {
            Ok(event) => {
                let translated = watch.tracker.lock().translate(&event);
                // never waits: the map entry is held until delivery ends
                for (event_type, path) in translated {
                    bus.try_publish(BackendEvent::watch(
                        &raw.watcher_id,
                        event_type,
                        path.display().to_string(),
                    ));
                }
            }
            Err(err) => {
                warn!("Watcher {} reported an error: {}", raw.watcher_id, err);
            }
        }
    }

    debug!("Watch dispatcher stopped");
}
