//! Client configuration.
//!
//! Settings come from, in increasing priority: built-in defaults, an optional
//! JSON file, the `KNITPI_SOCKET` environment variable, and command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ipc::MAX_BINDATA_SIZE;

/// Environment variable overriding the controller socket path.
pub const SOCKET_ENV_VAR: &str = "KNITPI_SOCKET";

/// Socket file name used under the runtime directory.
const SOCKET_FILE_NAME: &str = "knitpi.sock";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Resolve the default controller socket path.
///
/// Resolution order:
/// 1. `$KNITPI_SOCKET`
/// 2. `$XDG_RUNTIME_DIR/knitpi.sock`
/// 3. the platform runtime directory
/// 4. `/tmp/knitpi.sock`
pub fn default_socket_path() -> PathBuf {
    if let Ok(path) = std::env::var(SOCKET_ENV_VAR) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(SOCKET_FILE_NAME);
    }

    if let Some(runtime_dir) = dirs::runtime_dir() {
        return runtime_dir.join(SOCKET_FILE_NAME);
    }

    PathBuf::from("/tmp").join(SOCKET_FILE_NAME)
}

/// Transport and polling settings shared by every connection of a controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Path of the controller's Unix stream socket
    pub socket_path: PathBuf,
    /// Upper bound on one request/response round-trip; unbounded if absent
    pub request_timeout_ms: Option<u64>,
    /// Bound sent with `statuswait` once a watcher is past its first cycle
    pub status_wait_ms: u64,
    /// Minimum local wait between two steady-state status polls
    pub min_poll_interval_ms: u64,
    /// Local wait before reconnecting after a failed status poll
    pub retry_delay_ms: u64,
    /// Largest binary body accepted from the controller
    pub max_bindata_bytes: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            request_timeout_ms: None,
            status_wait_ms: 1000,
            min_poll_interval_ms: 100,
            retry_delay_ms: 1000,
            max_bindata_bytes: MAX_BINDATA_SIZE,
        }
    }
}

impl ClientConfig {
    /// Defaults with the given socket path.
    pub fn for_socket(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            ..Self::default()
        }
    }

    /// Load settings from a JSON file; missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Apply environment overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var(SOCKET_ENV_VAR) {
            if !path.is_empty() {
                self.socket_path = PathBuf::from(path);
            }
        }
        self
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn min_poll_interval(&self) -> Duration {
        Duration::from_millis(self.min_poll_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
