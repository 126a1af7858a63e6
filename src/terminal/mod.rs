//! Terminal Sessions
//!
//! One shell process per session id, with:
//! - output streamed as `terminal:data` events
//! - a single `terminal:exit` per shell, whether killed or exited on its own
//! - boolean results for operations on unknown ids

pub mod manager;
pub mod process;
pub mod state;

pub use manager::{TerminalError, TerminalManager};
pub use state::{CreateTerminalResult, TerminalInfo, TerminalSize, TerminalStatus};
