//! File Operations
//!
//! Stateless read/write/list/copy/move over the local filesystem.

pub mod error;
pub mod info;
pub mod service;

pub use error::{FileError, FileResult};
pub use info::FileInfo;
pub use service::FileService;
