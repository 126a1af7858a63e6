//! Command Protocol
//!
//! The closed set of commands the UI may issue, and the wire frames the
//! WebSocket transport wraps them in. Adding a command means adding a
//! variant here and a match arm in `Backend::dispatch`.

use serde::{Deserialize, Serialize};

use crate::events::{BackendEvent, EventKind};
use crate::files::FileInfo;
use crate::terminal::CreateTerminalResult;

/// Every request the UI can make
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "args", rename_all = "kebab-case")]
pub enum BackendCommand {
    TerminalCreate {
        id: String,
        #[serde(default)]
        cwd: Option<String>,
    },
    TerminalWrite {
        id: String,
        data: String,
    },
    TerminalResize {
        id: String,
        cols: u16,
        rows: u16,
    },
    TerminalDestroy {
        id: String,
    },
    FileRead {
        path: String,
    },
    FileWrite {
        path: String,
        content: String,
    },
    FileDelete {
        path: String,
    },
    FileCreateDirectory {
        path: String,
    },
    FileListDirectory {
        path: String,
    },
    FileCopy {
        src: String,
        dst: String,
    },
    FileMove {
        src: String,
        dst: String,
    },
    FileExists {
        path: String,
    },
    FileWatchDirectory {
        path: String,
    },
    FileStopWatching {
        #[serde(rename = "watcherId")]
        watcher_id: String,
    },
    FileGetRecent,
    StoreGet {
        key: String,
    },
    StoreSet {
        key: String,
        value: serde_json::Value,
    },
    StoreDelete {
        key: String,
    },
}

impl BackendCommand {
    /// Wire name of the command
    pub fn name(&self) -> &'static str {
        match self {
            Self::TerminalCreate { .. } => "terminal-create",
            Self::TerminalWrite { .. } => "terminal-write",
            Self::TerminalResize { .. } => "terminal-resize",
            Self::TerminalDestroy { .. } => "terminal-destroy",
            Self::FileRead { .. } => "file-read",
            Self::FileWrite { .. } => "file-write",
            Self::FileDelete { .. } => "file-delete",
            Self::FileCreateDirectory { .. } => "file-create-directory",
            Self::FileListDirectory { .. } => "file-list-directory",
            Self::FileCopy { .. } => "file-copy",
            Self::FileMove { .. } => "file-move",
            Self::FileExists { .. } => "file-exists",
            Self::FileWatchDirectory { .. } => "file-watch-directory",
            Self::FileStopWatching { .. } => "file-stop-watching",
            Self::FileGetRecent => "file-get-recent",
            Self::StoreGet { .. } => "store-get",
            Self::StoreSet { .. } => "store-set",
            Self::StoreDelete { .. } => "store-delete",
        }
    }
}

/// Successful result of a command
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CommandReply {
    Created(CreateTerminalResult),
    Flag(bool),
    Text(String),
    Entries(Vec<FileInfo>),
    Paths(Vec<String>),
    Value(Option<serde_json::Value>),
    Unit,
}

/// Frames sent by the UI over the WebSocket
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    /// Request/response call
    Request {
        #[serde(rename = "requestId")]
        request_id: u64,
        call: BackendCommand,
    },
    /// Start receiving the listed event kinds
    Subscribe { events: Vec<EventKind> },
    /// Stop receiving the listed event kinds
    Unsubscribe { events: Vec<EventKind> },
}

/// Frames sent to the UI over the WebSocket
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame {
    Response {
        #[serde(rename = "requestId")]
        request_id: Option<u64>,
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<CommandReply>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Event(BackendEvent),
}

impl ServerFrame {
    pub fn success(request_id: u64, result: CommandReply) -> Self {
        Self::Response {
            request_id: Some(request_id),
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(request_id: Option<u64>, error: impl Into<String>) -> Self {
        Self::Response {
            request_id,
            ok: false,
            result: None,
            error: Some(error.into()),
        }
    }
}
