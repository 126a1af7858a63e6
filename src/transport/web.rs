//! WebSocket transport
//!
//! Serves the command protocol over `/ws`. Each connection gets one send
//! task. Terminal commands run in frame order on the connection loop so
//! keystrokes reach the shell in the order they were typed; everything
//! else is dispatched on its own task so a slow file copy never holds up
//! terminal input.
//!
//! A connection owns the sessions and watches it creates: it only receives
//! their events, and they are torn down when the socket closes.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use super::protocol::{BackendCommand, ClientFrame, CommandReply, ServerFrame};
use crate::backend::Backend;
use crate::events::{BackendEvent, EventKind};

/// Build the application router. `dist` serves the UI bundle when given.
pub fn router(backend: Arc<Backend>, dist: Option<&Path>) -> Router {
    let router = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler));

    let router = match dist {
        Some(dist) => router.fallback_service(ServeDir::new(dist)),
        None => router,
    };

    router.layer(CorsLayer::permissive()).with_state(backend)
}

/// Serve until `shutdown` resolves
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on ws://{}/ws", addr);
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health_handler(State(backend): State<Arc<Backend>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "terminals": backend.terminals().count(),
        "watches": backend.watches().count(),
    }))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(backend): State<Arc<Backend>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, backend))
}

async fn handle_socket(socket: WebSocket, backend: Arc<Backend>) {
    info!("New WebSocket connection");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerFrame>(256);

    let send_task = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let json = match serde_json::to_string(&frame) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize frame: {}", e);
                    continue;
                }
            };
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                debug!("WebSocket send failed, client disconnected");
                break;
            }
        }
    });

    let mut conn = Connection::new(backend, out_tx);

    loop {
        tokio::select! {
            incoming = ws_rx.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!("WebSocket error: {}", e);
                        break;
                    }
                };

                match parse_frame(text.as_str()) {
                    Ok(frame) => conn.handle_frame(frame).await,
                    Err(frame) => conn.reply(frame).await,
                }
            }
            event = conn.events.next() => {
                match event {
                    Some(event) => {
                        if !conn.forward(event).await {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    conn.close();
    info!("WebSocket connection closed");
    send_task.abort();
}

/// Sessions and watches created through one connection
#[derive(Debug, Default)]
struct Owned {
    /// Terminal id -> generation of the session this connection created
    terminals: HashMap<String, u64>,
    watchers: HashSet<String>,
    /// Set once the socket is gone; late watch results are stopped at once
    closed: bool,
}

/// Per-connection state
struct Connection {
    backend: Arc<Backend>,
    out_tx: mpsc::Sender<ServerFrame>,
    events: ReceiverStream<BackendEvent>,
    /// A connection starts subscribed to nothing
    interest: HashSet<EventKind>,
    owned: Arc<Mutex<Owned>>,
}

impl Connection {
    fn new(backend: Arc<Backend>, out_tx: mpsc::Sender<ServerFrame>) -> Self {
        let events = ReceiverStream::new(backend.subscribe());
        Self {
            backend,
            out_tx,
            events,
            interest: HashSet::new(),
            owned: Arc::new(Mutex::new(Owned::default())),
        }
    }

    async fn reply(&self, frame: ServerFrame) {
        let _ = self.out_tx.send(frame).await;
    }

    async fn handle_frame(&mut self, frame: ClientFrame) {
        match frame {
            ClientFrame::Request { request_id, call } => {
                self.handle_request(request_id, call).await;
            }
            ClientFrame::Subscribe { events } => {
                debug!("Subscribed to {:?}", events);
                self.interest.extend(events);
            }
            ClientFrame::Unsubscribe { events } => {
                debug!("Unsubscribed from {:?}", events);
                for kind in events {
                    self.interest.remove(&kind);
                }
            }
        }
    }

    async fn handle_request(&mut self, request_id: u64, call: BackendCommand) {
        match call {
            BackendCommand::TerminalCreate { id, cwd } => {
                let (result, generation) = self
                    .backend
                    .terminals()
                    .create_with_generation(&id, cwd.as_deref());
                if let Some(generation) = generation {
                    self.owned.lock().terminals.insert(id, generation);
                }
                self.reply(ServerFrame::success(request_id, CommandReply::Created(result)))
                    .await;
            }
            call @ (BackendCommand::TerminalWrite { .. }
            | BackendCommand::TerminalResize { .. }
            | BackendCommand::TerminalDestroy { .. }) => {
                let frame = run_request(&self.backend, request_id, call).await;
                self.reply(frame).await;
            }
            BackendCommand::FileStopWatching { watcher_id } => {
                // no event for this watcher is forwarded past this point
                self.owned.lock().watchers.remove(&watcher_id);
                self.backend.stop_watching(&watcher_id);
                self.reply(ServerFrame::success(request_id, CommandReply::Unit))
                    .await;
            }
            BackendCommand::FileWatchDirectory { path } => {
                let backend = Arc::clone(&self.backend);
                let owned = Arc::clone(&self.owned);
                let out_tx = self.out_tx.clone();
                tokio::spawn(async move {
                    let frame = match backend.watch_directory(&path).await {
                        Ok(watcher_id) => {
                            let closed = {
                                let mut owned = owned.lock();
                                if !owned.closed {
                                    owned.watchers.insert(watcher_id.clone());
                                }
                                owned.closed
                            };
                            if closed {
                                backend.stop_watching(&watcher_id);
                                return;
                            }
                            ServerFrame::success(request_id, CommandReply::Text(watcher_id))
                        }
                        Err(e) => ServerFrame::failure(Some(request_id), e),
                    };
                    let _ = out_tx.send(frame).await;
                });
            }
            call => {
                let backend = Arc::clone(&self.backend);
                let out_tx = self.out_tx.clone();
                tokio::spawn(async move {
                    let frame = run_request(&backend, request_id, call).await;
                    let _ = out_tx.send(frame).await;
                });
            }
        }
    }

    /// Whether `event` comes from a session or watch this connection created
    fn owns(&self, event: &BackendEvent) -> bool {
        let owned = self.owned.lock();
        match event {
            BackendEvent::TerminalData(p) => owned.terminals.contains_key(&p.id),
            BackendEvent::TerminalExit(p) => owned.terminals.contains_key(&p.id),
            BackendEvent::WatchEvent(p) => owned.watchers.contains(&p.watcher_id),
        }
    }

    /// Forward one event if wanted. Returns false once the connection is gone.
    async fn forward(&self, event: BackendEvent) -> bool {
        if !self.interest.contains(&event.kind()) || !self.owns(&event) {
            return true;
        }
        self.out_tx.send(ServerFrame::Event(event)).await.is_ok()
    }

    /// Destroy the sessions and stop the watches this connection created
    fn close(&self) {
        let (terminals, watchers) = {
            let mut owned = self.owned.lock();
            owned.closed = true;
            (
                std::mem::take(&mut owned.terminals),
                std::mem::take(&mut owned.watchers),
            )
        };

        if !terminals.is_empty() || !watchers.is_empty() {
            info!(
                "Releasing {} terminal(s) and {} watch(es) of closed connection",
                terminals.len(),
                watchers.len()
            );
        }
        for (id, generation) in terminals {
            self.backend.terminals().destroy_generation(&id, generation);
        }
        for watcher_id in watchers {
            self.backend.stop_watching(&watcher_id);
        }
    }
}

/// Parse a client frame, or build the error response to send instead
fn parse_frame(text: &str) -> Result<ClientFrame, ServerFrame> {
    serde_json::from_str(text).map_err(|e| {
        warn!("Failed to parse client frame: {}", e);
        // echo the request id back when the frame was at least valid JSON
        let request_id = serde_json::from_str::<serde_json::Value>(text)
            .ok()
            .and_then(|value| value.get("requestId").and_then(|id| id.as_u64()));
        ServerFrame::failure(request_id, format!("Invalid frame: {}", e))
    })
}

async fn run_request(backend: &Backend, request_id: u64, call: BackendCommand) -> ServerFrame {
    let name = call.name();
    debug!("Request {} -> {}", request_id, name);

    match backend.dispatch(call).await {
        Ok(reply) => ServerFrame::success(request_id, reply),
        Err(e) => {
            debug!("Request {} ({}) failed: {}", request_id, name, e);
            ServerFrame::failure(Some(request_id), e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use crate::events::WatchEventType;
    use std::time::Duration;

    async fn backend(dir: &tempfile::TempDir, shell: &str) -> Arc<Backend> {
        let config = BackendConfig {
            shell: shell.to_string(),
            store_path: Some(dir.path().join("store.json")),
            default_cwd: Some(dir.path().to_path_buf()),
            ..BackendConfig::default()
        };
        Arc::new(Backend::new(config).await.unwrap())
    }

    fn request(request_id: u64, call: BackendCommand) -> ClientFrame {
        ClientFrame::Request { request_id, call }
    }

    fn subscribe_all() -> ClientFrame {
        ClientFrame::Subscribe {
            events: EventKind::ALL.to_vec(),
        }
    }

    #[test]
    fn test_parse_frame_reports_request_id() {
        let frame = parse_frame(r#"{"type":"request","requestId":9,"call":{"command":"nope"}}"#)
            .unwrap_err();
        let json = serde_json::to_value(frame).unwrap();
        assert_eq!(json["requestId"], 9);
        assert_eq!(json["ok"], false);

        let frame = parse_frame("not json").unwrap_err();
        let json = serde_json::to_value(frame).unwrap();
        assert_eq!(json["requestId"], serde_json::Value::Null);
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_terminal_writes_keep_frame_order() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(&dir, "/bin/cat").await;
        let (out_tx, mut out_rx) = mpsc::channel(2048);
        let mut conn = Connection::new(Arc::clone(&backend), out_tx);

        conn.handle_frame(subscribe_all()).await;
        conn.handle_frame(request(
            1,
            BackendCommand::TerminalCreate {
                id: "t1".into(),
                cwd: None,
            },
        ))
        .await;

        let expected: String = (0..400u32)
            .map(|i| char::from(b'a' + (i % 26) as u8))
            .collect();
        for (i, ch) in expected.chars().enumerate() {
            conn.handle_frame(request(
                2 + i as u64,
                BackendCommand::TerminalWrite {
                    id: "t1".into(),
                    data: ch.to_string(),
                },
            ))
            .await;
        }

        let mut echoed = String::new();
        while echoed.len() < expected.len() {
            let event = tokio::time::timeout(Duration::from_secs(10), conn.events.next())
                .await
                .expect("echo timed out")
                .expect("event bus closed");
            assert!(conn.forward(event).await);

            while let Ok(frame) = out_rx.try_recv() {
                if let ServerFrame::Event(BackendEvent::TerminalData(p)) = frame {
                    echoed.push_str(&p.data);
                }
            }
        }

        assert_eq!(echoed, expected);
        conn.close();
    }

    #[tokio::test]
    async fn test_watch_events_only_reach_the_owner() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(&dir, "/bin/sh").await;

        let (a_tx, mut a_rx) = mpsc::channel(16);
        let (b_tx, mut b_rx) = mpsc::channel(16);
        let mut a = Connection::new(Arc::clone(&backend), a_tx);
        let mut b = Connection::new(Arc::clone(&backend), b_tx);
        a.handle_frame(subscribe_all()).await;
        b.handle_frame(subscribe_all()).await;

        a.handle_frame(request(
            1,
            BackendCommand::FileWatchDirectory {
                path: dir.path().display().to_string(),
            },
        ))
        .await;
        let watcher_id = match tokio::time::timeout(Duration::from_secs(10), a_rx.recv())
            .await
            .unwrap()
            .unwrap()
        {
            ServerFrame::Response {
                result: Some(CommandReply::Text(id)),
                ..
            } => id,
            other => panic!("unexpected frame {:?}", other),
        };

        let event = BackendEvent::watch(&watcher_id, WatchEventType::Add, "/tmp/x");
        assert!(a.forward(event.clone()).await);
        assert!(b.forward(event.clone()).await);
        assert!(matches!(a_rx.try_recv(), Ok(ServerFrame::Event(_))));
        assert!(b_rx.try_recv().is_err());

        a.handle_frame(request(
            2,
            BackendCommand::FileStopWatching {
                watcher_id: watcher_id.clone(),
            },
        ))
        .await;
        assert!(matches!(a_rx.try_recv(), Ok(ServerFrame::Response { ok: true, .. })));
        assert!(a.forward(event).await);
        assert!(a_rx.try_recv().is_err());
        assert!(!backend.watches().is_watching(&watcher_id));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_close_releases_owned_sessions_and_watches() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(&dir, "/bin/sh").await;
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let mut conn = Connection::new(Arc::clone(&backend), out_tx);

        conn.handle_frame(request(
            1,
            BackendCommand::TerminalCreate {
                id: "mine".into(),
                cwd: None,
            },
        ))
        .await;
        conn.handle_frame(request(
            2,
            BackendCommand::FileWatchDirectory {
                path: dir.path().display().to_string(),
            },
        ))
        .await;
        for _ in 0..2 {
            let frame = tokio::time::timeout(Duration::from_secs(10), out_rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert!(matches!(frame, ServerFrame::Response { ok: true, .. }));
        }

        // created elsewhere; must survive this connection
        assert!(backend.create_terminal("other", None).success);

        assert!(backend.terminals().exists("mine"));
        assert_eq!(backend.watches().count(), 1);

        conn.close();

        assert!(!backend.terminals().exists("mine"));
        assert!(backend.terminals().exists("other"));
        assert_eq!(backend.watches().count(), 0);
        backend.shutdown();
    }

    #[tokio::test]
    async fn test_unsubscribed_kinds_are_not_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(&dir, "/bin/sh").await;
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let mut conn = Connection::new(backend, out_tx);

        conn.owned.lock().terminals.insert("t1".into(), 1);
        let data = BackendEvent::terminal_data("t1", "hi");

        assert!(conn.forward(data.clone()).await);
        assert!(out_rx.try_recv().is_err());

        conn.handle_frame(ClientFrame::Subscribe {
            events: vec![EventKind::TerminalData],
        })
        .await;
        assert!(conn.forward(data.clone()).await);
        assert!(matches!(out_rx.try_recv(), Ok(ServerFrame::Event(_))));

        conn.handle_frame(ClientFrame::Unsubscribe {
            events: vec![EventKind::TerminalData],
        })
        .await;
        assert!(conn.forward(data).await);
        assert!(out_rx.try_recv().is_err());
    }
}
