//! File Operation Errors
//!
//! Every variant names the operation and the offending path(s) and keeps
//! the underlying I/O error as its source.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileError {
    #[error("Failed to read file {}: {}", .path.display(), .source)]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {}: {}", .path.display(), .source)]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to delete {}: {}", .path.display(), .source)]
    Delete {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to create directory {}: {}", .path.display(), .source)]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to list directory {}: {}", .path.display(), .source)]
    ListDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to copy {} to {}: {}", .from.display(), .to.display(), .source)]
    Copy {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to move {} to {}: {}", .from.display(), .to.display(), .source)]
    Move {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

impl FileError {
    /// Name of the failed operation
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Read { .. } => "read",
            Self::Write { .. } => "write",
            Self::Delete { .. } => "delete",
            Self::CreateDirectory { .. } => "create-directory",
            Self::ListDirectory { .. } => "list-directory",
            Self::Copy { .. } => "copy",
            Self::Move { .. } => "move",
        }
    }

    /// Primary path involved (the source for copy/move)
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Read { path, .. }
            | Self::Write { path, .. }
            | Self::Delete { path, .. }
            | Self::CreateDirectory { path, .. }
            | Self::ListDirectory { path, .. } => path,
            Self::Copy { from, .. } | Self::Move { from, .. } => from,
        }
    }

    /// Underlying I/O error kind
    pub fn kind(&self) -> std::io::ErrorKind {
        match self {
            Self::Read { source, .. }
            | Self::Write { source, .. }
            | Self::Delete { source, .. }
            | Self::CreateDirectory { source, .. }
            | Self::ListDirectory { source, .. }
            | Self::Copy { source, .. }
            | Self::Move { source, .. } => source.kind(),
        }
    }
}

impl From<FileError> for String {
    fn from(err: FileError) -> String {
        err.to_string()
    }
}

/// Result type alias for file operations
pub type FileResult<T> = Result<T, FileError>;
