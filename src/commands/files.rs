//! File Commands
//!
//! File operations and directory watches.

use crate::commands::BackendState;
use crate::files::FileInfo;
use tauri::State;

#[tauri::command]
pub async fn file_read(backend: State<'_, BackendState>, path: String) -> Result<String, String> {
    Ok(backend.0.read_file(&path).await?)
}

#[tauri::command]
pub async fn file_write(
    backend: State<'_, BackendState>,
    path: String,
    content: String,
) -> Result<(), String> {
    Ok(backend.0.write_file(&path, &content).await?)
}

#[tauri::command]
pub async fn file_delete(backend: State<'_, BackendState>, path: String) -> Result<(), String> {
    Ok(backend.0.delete_path(&path).await?)
}

#[tauri::command]
pub async fn file_create_directory(
    backend: State<'_, BackendState>,
    path: String,
) -> Result<(), String> {
    Ok(backend.0.create_directory(&path).await?)
}

/// List the direct children of a directory
#[tauri::command]
pub async fn file_list_directory(
    backend: State<'_, BackendState>,
    path: String,
) -> Result<Vec<FileInfo>, String> {
    Ok(backend.0.list_directory(&path).await?)
}

#[tauri::command]
pub async fn file_copy(
    backend: State<'_, BackendState>,
    src: String,
    dst: String,
) -> Result<(), String> {
    Ok(backend.0.copy_path(&src, &dst).await?)
}

#[tauri::command]
pub async fn file_move(
    backend: State<'_, BackendState>,
    src: String,
    dst: String,
) -> Result<(), String> {
    Ok(backend.0.move_path(&src, &dst).await?)
}

#[tauri::command]
pub async fn file_exists(backend: State<'_, BackendState>, path: String) -> Result<bool, String> {
    Ok(backend.0.path_exists(&path).await)
}

/// Recently read or written files, most recent first
#[tauri::command]
pub async fn file_get_recent(backend: State<'_, BackendState>) -> Result<Vec<String>, String> {
    Ok(backend.0.recent_files().await)
}

/// Start a recursive watch and return its watcher id
#[tauri::command]
pub async fn file_watch_directory(
    backend: State<'_, BackendState>,
    path: String,
) -> Result<String, String> {
    Ok(backend.0.watch_directory(&path).await?)
}

#[tauri::command]
pub async fn file_stop_watching(
    backend: State<'_, BackendState>,
    watcher_id: String,
) -> Result<(), String> {
    backend.0.stop_watching(&watcher_id);
    Ok(())
}
