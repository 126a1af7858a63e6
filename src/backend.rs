//! Backend
//!
//! Owns every service behind the command boundary. Both transports hold an
//! `Arc<Backend>` and route commands through `dispatch`.

use log::{info, warn};
use serde_json::Value;

use crate::config::BackendConfig;
use crate::error::BackendResult;
use crate::events::{EventBus, EventReceiver};
use crate::files::{FileInfo, FileService};
use crate::store::PreferenceStore;
use crate::terminal::{CreateTerminalResult, TerminalInfo, TerminalManager};
use crate::transport::{BackendCommand, CommandReply};
use crate::watch::WatchManager;

pub struct Backend {
    config: BackendConfig,
    bus: EventBus,
    terminals: TerminalManager,
    files: FileService,
    watches: WatchManager,
    store: PreferenceStore,
}

impl Backend {
    /// Build every service. Must be called from within a tokio runtime.
    pub async fn new(config: BackendConfig) -> BackendResult<Self> {
        let bus = EventBus::new(config.event_capacity);
        let store = PreferenceStore::open(config.store_path(), config.recent_files_limit).await?;

        info!(
            "Backend ready (shell: {}, store: {})",
            config.shell,
            store.path().display()
        );

        Ok(Self {
            terminals: TerminalManager::new(&config, bus.clone()),
            watches: WatchManager::new(bus.clone()),
            files: FileService::new(),
            store,
            bus,
            config,
        })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Receive every event published from now on
    pub fn subscribe(&self) -> EventReceiver {
        self.bus.subscribe()
    }

    pub fn terminals(&self) -> &TerminalManager {
        &self.terminals
    }

    pub fn watches(&self) -> &WatchManager {
        &self.watches
    }

    pub fn store(&self) -> &PreferenceStore {
        &self.store
    }

    // Terminal sessions

    pub fn create_terminal(&self, id: &str, cwd: Option<&str>) -> CreateTerminalResult {
        self.terminals.create(id, cwd)
    }

    pub fn write_terminal(&self, id: &str, data: &str) -> bool {
        self.terminals.write(id, data)
    }

    pub fn resize_terminal(&self, id: &str, cols: u16, rows: u16) -> bool {
        self.terminals.resize(id, cols, rows)
    }

    pub fn destroy_terminal(&self, id: &str) -> bool {
        self.terminals.destroy(id)
    }

    /// Snapshot of every live session
    pub fn list_terminals(&self) -> Vec<TerminalInfo> {
        self.terminals.list()
    }

    // Files

    pub async fn read_file(&self, path: &str) -> BackendResult<String> {
        let content = self.files.read(path).await?;
        self.remember(path).await;
        Ok(content)
    }

    pub async fn write_file(&self, path: &str, content: &str) -> BackendResult<()> {
        self.files.write(path, content).await?;
        self.remember(path).await;
        Ok(())
    }

    pub async fn delete_path(&self, path: &str) -> BackendResult<()> {
        Ok(self.files.delete(path).await?)
    }

    pub async fn create_directory(&self, path: &str) -> BackendResult<()> {
        Ok(self.files.create_directory(path).await?)
    }

    pub async fn list_directory(&self, path: &str) -> BackendResult<Vec<FileInfo>> {
        Ok(self.files.list(path).await?)
    }

    pub async fn copy_path(&self, src: &str, dst: &str) -> BackendResult<()> {
        Ok(self.files.copy(src, dst).await?)
    }

    pub async fn move_path(&self, src: &str, dst: &str) -> BackendResult<()> {
        Ok(self.files.rename(src, dst).await?)
    }

    pub async fn path_exists(&self, path: &str) -> bool {
        self.files.exists(path).await
    }

    pub async fn recent_files(&self) -> Vec<String> {
        self.store.recent_files().await
    }

    /// A failed store write never fails the file operation that caused it
    async fn remember(&self, path: &str) {
        if let Err(e) = self.store.record_recent(path).await {
            warn!("Failed to record recent file {}: {}", path, e);
        }
    }

    // Watches

    pub async fn watch_directory(&self, path: &str) -> BackendResult<String> {
        Ok(self.watches.watch_directory(path).await?)
    }

    pub fn stop_watching(&self, watcher_id: &str) {
        self.watches.stop_watching(watcher_id);
    }

    // Preferences

    pub async fn store_get(&self, key: &str) -> Option<Value> {
        self.store.get(key).await
    }

    pub async fn store_set(&self, key: &str, value: Value) -> BackendResult<()> {
        Ok(self.store.set(key, value).await?)
    }

    pub async fn store_delete(&self, key: &str) -> BackendResult<()> {
        Ok(self.store.delete(key).await?)
    }

    /// Execute one command from the closed command set
    pub async fn dispatch(&self, command: BackendCommand) -> BackendResult<CommandReply> {
        use BackendCommand::*;

        let reply = match command {
            TerminalCreate { id, cwd } => {
                CommandReply::Created(self.create_terminal(&id, cwd.as_deref()))
            }
            TerminalWrite { id, data } => CommandReply::Flag(self.write_terminal(&id, &data)),
            TerminalResize { id, cols, rows } => {
                CommandReply::Flag(self.resize_terminal(&id, cols, rows))
            }
            TerminalDestroy { id } => CommandReply::Flag(self.destroy_terminal(&id)),
            FileRead { path } => CommandReply::Text(self.read_file(&path).await?),
            FileWrite { path, content } => {
                self.write_file(&path, &content).await?;
                CommandReply::Unit
            }
            FileDelete { path } => {
                self.delete_path(&path).await?;
                CommandReply::Unit
            }
            FileCreateDirectory { path } => {
                self.create_directory(&path).await?;
                CommandReply::Unit
            }
            FileListDirectory { path } => CommandReply::Entries(self.list_directory(&path).await?),
            FileCopy { src, dst } => {
                self.copy_path(&src, &dst).await?;
                CommandReply::Unit
            }
            FileMove { src, dst } => {
                self.move_path(&src, &dst).await?;
                CommandReply::Unit
            }
            FileExists { path } => CommandReply::Flag(self.path_exists(&path).await),
            FileWatchDirectory { path } => CommandReply::Text(self.watch_directory(&path).await?),
            FileStopWatching { watcher_id } => {
                self.stop_watching(&watcher_id);
                CommandReply::Unit
            }
            FileGetRecent => CommandReply::Paths(self.recent_files().await),
            StoreGet { key } => CommandReply::Value(self.store_get(&key).await),
            StoreSet { key, value } => {
                self.store_set(&key, value).await?;
                CommandReply::Unit
            }
            StoreDelete { key } => {
                self.store_delete(&key).await?;
                CommandReply::Unit
            }
        };

        Ok(reply)
    }

    /// Destroy every session and stop every watch - for app exit
    pub fn shutdown(&self) {
        info!(
            "Shutting down {} terminal(s) and {} watch(es)",
            self.terminals.count(),
            self.watches.count()
        );
        self.terminals.shutdown_all();
        self.watches.stop_all();
    }
}
