//! Preference Store Commands

use crate::commands::BackendState;
use serde_json::Value;
use tauri::State;

#[tauri::command]
pub async fn store_get(
    backend: State<'_, BackendState>,
    key: String,
) -> Result<Option<Value>, String> {
    Ok(backend.0.store_get(&key).await)
}

#[tauri::command]
pub async fn store_set(
    backend: State<'_, BackendState>,
    key: String,
    value: Value,
) -> Result<(), String> {
    Ok(backend.0.store_set(&key, value).await?)
}

#[tauri::command]
pub async fn store_delete(backend: State<'_, BackendState>, key: String) -> Result<(), String> {
    Ok(backend.0.store_delete(&key).await?)
}
