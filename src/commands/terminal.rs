//! Terminal Commands

use crate::commands::BackendState;
use crate::terminal::{CreateTerminalResult, TerminalInfo};
use tauri::State;

/// Spawn a shell session
#[tauri::command]
pub async fn terminal_create(
    backend: State<'_, BackendState>,
    id: String,
    cwd: Option<String>,
) -> Result<CreateTerminalResult, String> {
    Ok(backend.0.create_terminal(&id, cwd.as_deref()))
}

/// Send input to a session
#[tauri::command]
pub async fn terminal_write(
    backend: State<'_, BackendState>,
    id: String,
    data: String,
) -> Result<bool, String> {
    Ok(backend.0.write_terminal(&id, &data))
}

/// Record a new terminal geometry
#[tauri::command]
pub async fn terminal_resize(
    backend: State<'_, BackendState>,
    id: String,
    cols: u16,
    rows: u16,
) -> Result<bool, String> {
    Ok(backend.0.resize_terminal(&id, cols, rows))
}

/// Kill a session
#[tauri::command]
pub async fn terminal_destroy(
    backend: State<'_, BackendState>,
    id: String,
) -> Result<bool, String> {
    Ok(backend.0.destroy_terminal(&id))
}

/// List live sessions
#[tauri::command]
pub async fn terminal_list(backend: State<'_, BackendState>) -> Result<Vec<TerminalInfo>, String> {
    Ok(backend.0.list_terminals())
}
