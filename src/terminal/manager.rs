//! Terminal Manager
//!
//! Session registry for shell processes, backed by DashMap.
//! The map entry is the single owner of a session's process handle;
//! explicit destroy and autonomous exit both end in removing that entry.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::process::{validate_cwd, ShellLauncher, ShellProcess};
use super::state::{CreateTerminalResult, TerminalInfo, TerminalSize, TerminalStatus};
use crate::config::BackendConfig;
use crate::events::EventBus;

/// One live terminal session
#[derive(Debug)]
pub struct TerminalSession {
    /// Caller-supplied session identifier
    pub id: String,
    /// Working directory the shell was started in
    pub cwd: PathBuf,
    /// Current status
    pub status: TerminalStatus,
    /// Last requested geometry
    pub size: TerminalSize,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// Distinguishes this session from later ones reusing the same id
    generation: u64,
    /// Process handle
    process: ShellProcess,
}

/// Terminal manager errors
#[derive(Debug, thiserror::Error)]
pub enum TerminalError {
    #[error("Terminal already exists: {0}")]
    AlreadyExists(String),

    #[error("Maximum terminals reached: {0}")]
    LimitReached(usize),

    #[error("{0}")]
    InvalidCwd(String),

    #[error("Failed to spawn {shell}: {source}")]
    Spawn {
        shell: String,
        source: std::io::Error,
    },
}

impl From<TerminalError> for String {
    fn from(err: TerminalError) -> String {
        err.to_string()
    }
}

/// Terminal Manager - owns every shell session
pub struct TerminalManager {
    /// Live sessions (id -> TerminalSession)
    sessions: Arc<DashMap<String, TerminalSession>>,
    /// Where output and exit events go
    bus: EventBus,
    /// Shell launch settings
    launcher: ShellLauncher,
    /// Working directory for sessions created without one
    default_cwd: PathBuf,
    /// Maximum concurrent sessions allowed
    max_sessions: usize,
    /// Sessions in the map, reserved under the entry lock
    live: Arc<AtomicUsize>,
    /// Source of session generations
    next_generation: AtomicU64,
}

impl TerminalManager {
    /// Create a terminal manager from the backend configuration
    pub fn new(config: &BackendConfig, bus: EventBus) -> Self {
        let launcher = ShellLauncher {
            program: config.shell.clone(),
            args: config.shell_args.clone(),
            buffer_size: config.output_buffer_size,
            exit_grace: Duration::from_millis(config.exit_grace_ms),
        };

        Self {
            sessions: Arc::new(DashMap::new()),
            bus,
            launcher,
            default_cwd: config.fallback_cwd(),
            max_sessions: config.max_sessions,
            live: Arc::new(AtomicUsize::new(0)),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Spawn a shell for `id`.
    ///
    /// Failures are reported in the result, never as an error, and an
    /// existing session with the same id is left untouched.
    pub fn create(&self, id: &str, cwd: Option<&str>) -> CreateTerminalResult {
        self.create_with_generation(id, cwd).0
    }

    /// Like [`create`](Self::create), also returning the new session's
    /// generation so the caller can later destroy exactly this session.
    pub fn create_with_generation(
        &self,
        id: &str,
        cwd: Option<&str>,
    ) -> (CreateTerminalResult, Option<u64>) {
        match self.try_create(id, cwd) {
            Ok(generation) => (CreateTerminalResult::ok(), Some(generation)),
            Err(e) => {
                warn!("Failed to create terminal {}: {}", id, e);
                (CreateTerminalResult::failed(e.to_string()), None)
            }
        }
    }

    fn try_create(&self, id: &str, cwd: Option<&str>) -> Result<u64, TerminalError> {
        let cwd = match cwd {
            Some(cwd) if !cwd.is_empty() => PathBuf::from(cwd),
            _ => self.default_cwd.clone(),
        };
        let cwd = validate_cwd(&cwd).map_err(TerminalError::InvalidCwd)?;

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let io = match self.sessions.entry(id.to_string()) {
            Entry::Occupied(_) => return Err(TerminalError::AlreadyExists(id.to_string())),
            Entry::Vacant(slot) => {
                let max = self.max_sessions;
                self.live
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                        (n < max).then_some(n + 1)
                    })
                    .map_err(|_| TerminalError::LimitReached(max))?;

                let (process, io) = match self.launcher.spawn(&cwd) {
                    Ok(spawned) => spawned,
                    Err(source) => {
                        self.live.fetch_sub(1, Ordering::AcqRel);
                        return Err(TerminalError::Spawn {
                            shell: self.launcher.program.clone(),
                            source,
                        });
                    }
                };

                info!(
                    "Created terminal {} (pid {:?}) in {}",
                    id,
                    process.pid,
                    cwd.display()
                );

                slot.insert(TerminalSession {
                    id: id.to_string(),
                    cwd,
                    status: TerminalStatus::Running,
                    size: TerminalSize::default(),
                    created_at: Utc::now(),
                    generation,
                    process,
                });
                io
            }
        };

        let sessions = Arc::clone(&self.sessions);
        let live = Arc::clone(&self.live);
        let session_id = id.to_string();
        let on_exit = move || Self::remove_exited(&sessions, &live, &session_id, generation);
        tokio::spawn(io.supervise(id.to_string(), self.bus.clone(), on_exit));

        Ok(generation)
    }

    /// Exit path: drop the entry only if it still belongs to the shell
    /// that just exited.
    fn remove_exited(
        sessions: &DashMap<String, TerminalSession>,
        live: &AtomicUsize,
        id: &str,
        generation: u64,
    ) {
        if let Some(mut session) = sessions.get_mut(id) {
            if session.generation == generation {
                session.status = TerminalStatus::Exited;
            }
        }

        if sessions
            .remove_if(id, |_, session| session.generation == generation)
            .is_some()
        {
            live.fetch_sub(1, Ordering::AcqRel);
            debug!("Removed exited terminal {}", id);
        }
    }

    /// Forward `data` to the session's stdin. False for unknown ids.
    pub fn write(&self, id: &str, data: &str) -> bool {
        match self.sessions.get(id) {
            Some(session) if session.status == TerminalStatus::Running => {
                session.process.write(data)
            }
            _ => false,
        }
    }

    /// Record a geometry change. The shell runs on plain pipes, so the
    /// new size is stored but not applied to the process.
    pub fn resize(&self, id: &str, cols: u16, rows: u16) -> bool {
        match self.sessions.get_mut(id) {
            Some(mut session) => {
                session.size = TerminalSize { cols, rows };
                debug!("Terminal {} resized to {}x{}", id, cols, rows);
                true
            }
            None => false,
        }
    }

    /// Kill the shell and remove the session. False if it was already gone.
    pub fn destroy(&self, id: &str) -> bool {
        let removed = self.sessions.remove(id);
        self.terminate_removed(id, removed)
    }

    /// Destroy `id` only if it is still the session created as `generation`
    pub fn destroy_generation(&self, id: &str, generation: u64) -> bool {
        let removed = self
            .sessions
            .remove_if(id, |_, session| session.generation == generation);
        self.terminate_removed(id, removed)
    }

    fn terminate_removed(&self, id: &str, removed: Option<(String, TerminalSession)>) -> bool {
        match removed {
            Some((_, mut session)) => {
                self.live.fetch_sub(1, Ordering::AcqRel);
                session.process.terminate();
                info!("Destroyed terminal {}", id);
                true
            }
            None => false,
        }
    }

    /// Check if a session exists
    pub fn exists(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Get total session count
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Snapshot of a single session
    pub fn info(&self, id: &str) -> Option<TerminalInfo> {
        self.sessions.get(id).map(|s| self.to_info(s.value()))
    }

    /// Snapshot of all sessions, ordered by creation
    pub fn list(&self) -> Vec<TerminalInfo> {
        let mut infos: Vec<(u64, TerminalInfo)> = self
            .sessions
            .iter()
            .map(|s| (s.generation, self.to_info(s.value())))
            .collect();
        infos.sort_by_key(|(generation, _)| *generation);
        infos.into_iter().map(|(_, info)| info).collect()
    }

    fn to_info(&self, session: &TerminalSession) -> TerminalInfo {
        TerminalInfo {
            id: session.id.clone(),
            cwd: session.cwd.display().to_string(),
            shell: self.launcher.program.clone(),
            pid: session.process.pid,
            status: session.status,
            cols: session.size.cols,
            rows: session.size.rows,
            created_at: session.created_at.to_rfc3339(),
        }
    }

    /// Destroy all sessions - for cleanup on app exit
    pub fn shutdown_all(&self) {
        let ids: Vec<String> = self.sessions.iter().map(|s| s.id.clone()).collect();
        if ids.is_empty() {
            return;
        }

        info!("Shutting down {} terminals", ids.len());
        for id in ids {
            self.destroy(&id);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::events::BackendEvent;

    fn manager(max_sessions: usize) -> (TerminalManager, EventBus) {
        let config = BackendConfig {
            shell: "/bin/sh".to_string(),
            max_sessions,
            ..Default::default()
        };
        let bus = EventBus::new(256);
        (TerminalManager::new(&config, bus.clone()), bus)
    }

    async fn wait_for_exit(rx: &mut crate::events::EventReceiver, id: &str) {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                match rx.recv().await {
                    Some(BackendEvent::TerminalExit(p)) if p.id == id => break,
                    Some(_) => {}
                    None => panic!("event bus closed"),
                }
            }
        })
        .await
        .expect("terminal did not exit");
    }

    #[tokio::test]
    async fn test_create_and_destroy() {
        let (manager, bus) = manager(4);
        let mut rx = bus.subscribe();

        assert!(manager.create("t1", None).success);
        assert!(manager.exists("t1"));
        assert!(manager.write("t1", "true\n"));

        assert!(manager.destroy("t1"));
        assert!(!manager.destroy("t1"));
        assert!(!manager.exists("t1"));

        wait_for_exit(&mut rx, "t1").await;
    }

    #[tokio::test]
    async fn test_duplicate_id_keeps_existing_session() {
        let (manager, _bus) = manager(4);
        assert!(manager.create("dup", None).success);
        let pid = manager.info("dup").unwrap().pid;

        let result = manager.create("dup", None);
        assert!(!result.success);
        assert!(result.error.unwrap().contains("already exists"));
        assert_eq!(manager.info("dup").unwrap().pid, pid);

        manager.shutdown_all();
    }

    #[tokio::test]
    async fn test_max_sessions() {
        let (manager, _bus) = manager(1);
        assert!(manager.create("a", None).success);
        let result = manager.create("b", None);
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Maximum terminals"));
        manager.shutdown_all();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_respect_limit() {
        let (manager, _bus) = manager(3);
        let manager = Arc::new(manager);

        let handles: Vec<_> = (0..12)
            .map(|i| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.create(&format!("c{}", i), None).success })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap() {
                created += 1;
            }
        }

        assert_eq!(created, 3);
        assert_eq!(manager.count(), 3);
        manager.shutdown_all();
        assert!(manager.create("after", None).success);
        manager.shutdown_all();
    }

    #[tokio::test]
    async fn test_destroy_generation_only_hits_that_session() {
        let (manager, _bus) = manager(4);

        let (result, old) = manager.create_with_generation("g", None);
        assert!(result.success);
        let old = old.unwrap();
        assert!(manager.destroy("g"));

        let (_, new) = manager.create_with_generation("g", None);
        assert!(!manager.destroy_generation("g", old));
        assert!(manager.exists("g"));
        assert!(manager.destroy_generation("g", new.unwrap()));
        assert!(!manager.exists("g"));
    }

    #[tokio::test]
    async fn test_resize_records_geometry() {
        let (manager, _bus) = manager(4);
        assert!(!manager.resize("nope", 100, 40));

        assert!(manager.create("r", None).success);
        assert!(manager.resize("r", 132, 43));
        let info = manager.info("r").unwrap();
        assert_eq!((info.cols, info.rows), (132, 43));
        manager.shutdown_all();
    }

    #[tokio::test]
    async fn test_autonomous_exit_removes_session() {
        let (manager, bus) = manager(4);
        let mut rx = bus.subscribe();

        assert!(manager.create("quit", None).success);
        assert!(manager.write("quit", "exit\n"));
        wait_for_exit(&mut rx, "quit").await;

        assert!(!manager.exists("quit"));
        assert!(!manager.write("quit", "echo late\n"));
        assert!(!manager.destroy("quit"));
    }

    #[tokio::test]
    async fn test_stale_exit_does_not_remove_new_session() {
        let (manager, bus) = manager(4);
        let mut rx = bus.subscribe();

        assert!(manager.create("reuse", None).success);
        assert!(manager.destroy("reuse"));
        assert!(manager.create("reuse", None).success);

        wait_for_exit(&mut rx, "reuse").await;
        assert!(manager.exists("reuse"));
        assert!(manager.write("reuse", "true\n"));
        manager.shutdown_all();
    }
}
