//! Vibe Editor backend
//!
//! Terminal sessions, file operations and directory watches for the editor
//! UI, reachable through the Tauri shell or the WebSocket server.

pub mod backend;
#[cfg(feature = "desktop")]
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod files;
pub mod store;
pub mod terminal;
pub mod transport;
pub mod watch;

pub use backend::Backend;
pub use config::BackendConfig;
pub use error::{BackendError, BackendResult};

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use std::sync::Arc;
    use tauri::Manager;

    use commands::{files::*, store::*, terminal::*, BackendState};

    tauri::Builder::default()
        .setup(|app| {
            let config = BackendConfig::load(None)?;
            let backend = Arc::new(tauri::async_runtime::block_on(Backend::new(config))?);

            commands::setup_event_emitter(app.handle().clone(), Arc::clone(&backend));
            app.manage(BackendState(backend));
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            terminal_create,
            terminal_write,
            terminal_resize,
            terminal_destroy,
            terminal_list,
            file_read,
            file_write,
            file_delete,
            file_create_directory,
            file_list_directory,
            file_copy,
            file_move,
            file_exists,
            file_get_recent,
            file_watch_directory,
            file_stop_watching,
            store_get,
            store_set,
            store_delete,
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(|app, event| {
            if let tauri::RunEvent::Exit = event {
                if let Some(state) = app.try_state::<BackendState>() {
                    state.0.shutdown();
                }
            }
        });
}
