//! Boundary Transport
//!
//! The command protocol shared by both transports, and the WebSocket
//! server used outside the desktop shell.

pub mod protocol;
pub mod web;

pub use protocol::{BackendCommand, ClientFrame, CommandReply, ServerFrame};
pub use web::{router, serve};
