//! Preference Store
//!
//! JSON-file-backed key/value store for UI preferences, plus the
//! recent-files list kept under the `recentFiles` key. Every mutation is
//! persisted before it returns, via a temp file renamed over the old one.

use log::{debug, warn};
use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;

/// Key holding the recent-files list
pub const RECENT_FILES_KEY: &str = "recentFiles";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read store {}: {}", .path.display(), .source)]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to persist store {}: {}", .path.display(), .source)]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<StoreError> for String {
    fn from(err: StoreError) -> String {
        err.to_string()
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Persistent key/value store
pub struct PreferenceStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
    recent_limit: usize,
}

impl PreferenceStore {
    /// Open the store at `path`. A missing file starts empty; a corrupt one
    /// is logged and replaced on the next write.
    pub async fn open(path: impl Into<PathBuf>, recent_limit: usize) -> StoreResult<Self> {
        let path = path.into();

        let values = match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<Map<String, Value>>(&content) {
                Ok(values) => values,
                Err(e) => {
                    warn!("Ignoring corrupt store {}: {}", path.display(), e);
                    Map::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No store at {}, starting empty", path.display());
                Map::new()
            }
            Err(source) => return Err(StoreError::Read { path, source }),
        };

        Ok(Self {
            path,
            values: Mutex::new(values),
            recent_limit,
        })
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.values.lock().await.get(key).cloned()
    }

    pub async fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        let mut values = self.values.lock().await;
        let mut next = values.clone();
        next.insert(key.to_string(), value);
        self.commit(&mut values, next).await
    }

    pub async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut values = self.values.lock().await;
        if !values.contains_key(key) {
            return Ok(());
        }
        let mut next = values.clone();
        next.remove(key);
        self.commit(&mut values, next).await
    }

    /// Recent files, most recent first
    pub async fn recent_files(&self) -> Vec<String> {
        self.values
            .lock()
            .await
            .get(RECENT_FILES_KEY)
            .map(parse_recent)
            .unwrap_or_default()
    }

    /// Move `path` to the front of the recent-files list
    pub async fn record_recent(&self, path: &str) -> StoreResult<()> {
        let mut values = self.values.lock().await;
        let mut recent = values
            .get(RECENT_FILES_KEY)
            .map(parse_recent)
            .unwrap_or_default();

        recent.retain(|p| p != path);
        recent.insert(0, path.to_string());
        recent.truncate(self.recent_limit);

        let mut next = values.clone();
        next.insert(RECENT_FILES_KEY.to_string(), Value::from(recent));
        self.commit(&mut values, next).await
    }

    /// Persist `next`, then make it the in-memory state. On failure memory
    /// keeps matching the file. Caller holds the values lock, so writes land
    /// in mutation order.
    async fn commit(
        &self,
        values: &mut Map<String, Value>,
        next: Map<String, Value>,
    ) -> StoreResult<()> {
        let content = serde_json::to_vec_pretty(&next)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomically(&path, &content)).await??;
        *values = next;
        Ok(())
    }
}

fn write_atomically(path: &Path, content: &[u8]) -> StoreResult<()> {
    let to_error = |source| StoreError::Persist {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(to_error)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(to_error)?;
    tmp.write_all(content).map_err(to_error)?;
    tmp.as_file().sync_all().map_err(to_error)?;
    tmp.persist(path).map_err(|e| to_error(e.error))?;
    Ok(())
}

fn parse_recent(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
