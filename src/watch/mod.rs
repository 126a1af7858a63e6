//! Directory Watches
//!
//! Recursive filesystem watches reported as `watch:event` notifications.

pub mod manager;
pub mod translate;

pub use manager::{WatchError, WatchManager};
