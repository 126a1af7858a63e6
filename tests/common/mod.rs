#![allow(dead_code)]

use std::time::Duration;
use tempfile::TempDir;
use vibe_editor_lib::events::{BackendEvent, EventReceiver};
use vibe_editor_lib::{Backend, BackendConfig};

/// Config with its store inside `dir` and a plain POSIX shell
pub fn config(dir: &TempDir) -> BackendConfig {
    BackendConfig {
        shell: "/bin/sh".to_string(),
        store_path: Some(dir.path().join("store.json")),
        default_cwd: Some(dir.path().to_path_buf()),
        ..BackendConfig::default()
    }
}

pub async fn backend(dir: &TempDir) -> Backend {
    Backend::new(config(dir)).await.expect("backend starts")
}

/// Wait for the first event matching `pred`
pub async fn next_matching<F>(
    rx: &mut EventReceiver,
    timeout: Duration,
    mut pred: F,
) -> Option<BackendEvent>
where
    F: FnMut(&BackendEvent) -> bool,
{
    tokio::time::timeout(timeout, async {
        while let Some(event) = rx.recv().await {
            if pred(&event) {
                return Some(event);
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}

/// Every event received within `window`
pub async fn collect_for(rx: &mut EventReceiver, window: Duration) -> Vec<BackendEvent> {
    let mut events = Vec::new();
    let _ = tokio::time::timeout(window, async {
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
    })
    .await;
    events
}
