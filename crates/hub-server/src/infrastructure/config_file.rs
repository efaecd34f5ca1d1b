//! TOML configuration file for the hub server.
//!
//! The file is optional.  Every field has a default, so a partial file (or an
//! empty one) is valid:
//!
//! ```toml
//! [server]
//! listen_addr = "0.0.0.0:8080"
//! endpoint_path = "/ws"
//! broadcast_backlog = 1024
//!
//! [session]
//! pong_wait_secs = 60
//! write_wait_secs = 10
//! max_message_size = 512
//! queue_capacity = 256
//! ```
//!
//! Values from the file sit between the built-in defaults and the command
//! line: `main.rs` loads the file, converts it with
//! [`FileConfig::into_hub_config`], then applies CLI overrides.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::domain::HubConfig;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// A file system I/O error occurred.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level layout of the configuration file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub session: SessionSection,
}

/// Listener and hub settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ServerSection {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default = "default_endpoint_path")]
    pub endpoint_path: String,
    #[serde(default = "default_broadcast_backlog")]
    pub broadcast_backlog: usize,
}

/// Per-connection timings and limits.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SessionSection {
    /// Idle deadline in seconds; pings go out at nine tenths of it.
    #[serde(default = "default_pong_wait_secs")]
    pub pong_wait_secs: u64,
    #[serde(default = "default_write_wait_secs")]
    pub write_wait_secs: u64,
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_listen_addr() -> SocketAddr {
    HubConfig::default().listen_addr
}
fn default_endpoint_path() -> String {
    HubConfig::default().endpoint_path
}
fn default_broadcast_backlog() -> usize {
    HubConfig::default().broadcast_backlog
}
fn default_pong_wait_secs() -> u64 {
    HubConfig::default().pong_wait.as_secs()
}
fn default_write_wait_secs() -> u64 {
    HubConfig::default().write_wait.as_secs()
}
fn default_max_message_size() -> usize {
    HubConfig::default().max_message_size
}
fn default_queue_capacity() -> usize {
    HubConfig::default().queue_capacity
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            endpoint_path: default_endpoint_path(),
            broadcast_backlog: default_broadcast_backlog(),
        }
    }
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            pong_wait_secs: default_pong_wait_secs(),
            write_wait_secs: default_write_wait_secs(),
            max_message_size: default_max_message_size(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl FileConfig {
    /// Converts the file layout into the runtime configuration.
    pub fn into_hub_config(self) -> HubConfig {
        HubConfig {
            listen_addr: self.server.listen_addr,
            endpoint_path: self.server.endpoint_path,
            pong_wait: Duration::from_secs(self.session.pong_wait_secs),
            write_wait: Duration::from_secs(self.session.write_wait_secs),
            max_message_size: self.session.max_message_size,
            queue_capacity: self.session.queue_capacity,
            broadcast_backlog: self.server.broadcast_backlog,
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Parses configuration from TOML text.
///
/// # Errors
///
/// Returns [`ConfigFileError::Parse`] if the TOML is malformed or a value has
/// the wrong type.
pub fn parse_config(content: &str) -> Result<FileConfig, ConfigFileError> {
    Ok(toml::from_str(content)?)
}

/// Loads configuration from `path`.  The file must exist; only its fields
/// are optional.
///
/// # Errors
///
/// Returns [`ConfigFileError::Io`] if the file cannot be read and
/// [`ConfigFileError::Parse`] if it is malformed.
pub fn load_config_file(path: &Path) -> Result<FileConfig, ConfigFileError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
