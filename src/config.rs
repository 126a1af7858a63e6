//! Backend Configuration
//!
//! Loaded once at startup from `<config_dir>/vibe-editor/config.toml`
//! (or an explicit path), then patched with environment overrides.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory name under the platform config dir
pub const APP_DIR_NAME: &str = "vibe-editor";

/// Overrides the shell program
pub const ENV_SHELL: &str = "VIBE_SHELL";
/// Overrides the preference store location
pub const ENV_STORE_PATH: &str = "VIBE_STORE_PATH";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {}: {}", .path.display(), .source)]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {}: {}", .path.display(), .source)]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Runtime configuration for the backend services
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Shell program spawned for every terminal session
    pub shell: String,
    /// Arguments passed to the shell
    pub shell_args: Vec<String>,
    /// Working directory for sessions created without one
    pub default_cwd: Option<PathBuf>,
    /// Maximum number of live terminal sessions
    pub max_sessions: usize,
    /// Events queued per subscriber before publishers wait for it
    pub event_capacity: usize,
    /// Read buffer size for terminal output
    pub output_buffer_size: usize,
    /// How long to keep draining output after a shell exits (ms)
    pub exit_grace_ms: u64,
    /// Number of entries kept in the recent-files list
    pub recent_files_limit: usize,
    /// Preference store location
    pub store_path: Option<PathBuf>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            shell_args: Vec::new(),
            default_cwd: None,
            max_sessions: 32,
            event_capacity: 1024,
            output_buffer_size: 8192,
            exit_grace_ms: 2000,
            recent_files_limit: 10,
            store_path: None,
        }
    }
}

impl BackendConfig {
    /// Load configuration.
    ///
    /// An explicit `path` must exist. Without one the default location is
    /// used when present, otherwise built-in defaults apply.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.is_file() => Self::from_file(&path)?,
                _ => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_env();
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(shell) = std::env::var(ENV_SHELL) {
            if shell.trim().is_empty() {
                warn!("Ignoring empty {}", ENV_SHELL);
            } else {
                self.shell = shell;
            }
        }
        if let Ok(store) = std::env::var(ENV_STORE_PATH) {
            self.store_path = Some(PathBuf::from(store));
        }
    }

    /// Resolved preference store path
    pub fn store_path(&self) -> PathBuf {
        self.store_path.clone().unwrap_or_else(|| {
            dirs::config_dir()
                .map(|dir| dir.join(APP_DIR_NAME))
                .unwrap_or_else(|| PathBuf::from(".").join(format!(".{}", APP_DIR_NAME)))
                .join("store.json")
        })
    }

    /// Working directory used when a session is created without one
    pub fn fallback_cwd(&self) -> PathBuf {
        self.default_cwd
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Default config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join("config.toml"))
}

/// Platform default shell: `cmd.exe` on Windows, `bash` elsewhere.
pub fn default_shell() -> String {
    if cfg!(windows) {
        return std::env::var("COMSPEC").unwrap_or_else(|_| "cmd.exe".to_string());
    }

    match which::which("bash") {
        Ok(path) => path.to_string_lossy().into_owned(),
        Err(_) => "/bin/sh".to_string(),
    }
}
