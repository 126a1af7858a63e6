//! Backend Error Types

use thiserror::Error;

use crate::config::ConfigError;
use crate::files::FileError;
use crate::store::StoreError;
use crate::watch::WatchError;

/// Errors surfaced across the command boundary
#[derive(Error, Debug)]
pub enum BackendError {
    #[error(transparent)]
    File(#[from] FileError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<BackendError> for String {
    fn from(err: BackendError) -> String {
        err.to_string()
    }
}

/// Result type alias for backend operations
pub type BackendResult<T> = Result<T, BackendError>;
