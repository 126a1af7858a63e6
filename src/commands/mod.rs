//! Tauri Commands
//!
//! One `#[tauri::command]` per protocol command, plus the emitter that
//! forwards backend events to the webview.

pub mod files;
pub mod store;
pub mod terminal;

use log::{debug, warn};
use std::sync::Arc;
use tauri::{AppHandle, Emitter};

use crate::backend::Backend;
use crate::events::BackendEvent;

/// Backend state shared by every command
pub struct BackendState(pub Arc<Backend>);

/// Forward backend events to the webview
pub fn setup_event_emitter(app: AppHandle, backend: Arc<Backend>) {
    let mut rx = backend.subscribe();

    tauri::async_runtime::spawn(async move {
        while let Some(event) = rx.recv().await {
            let event_name = event.event_name();
            let result = match &event {
                BackendEvent::TerminalData(payload) => app.emit(event_name, payload),
                BackendEvent::TerminalExit(payload) => app.emit(event_name, payload),
                BackendEvent::WatchEvent(payload) => app.emit(event_name, payload),
            };

            if let Err(e) = result {
                warn!("Failed to emit {}: {}", event_name, e);
            }
        }

        debug!("Event emitter stopped");
    });
}
