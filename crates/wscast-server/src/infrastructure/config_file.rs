//! Optional TOML configuration file.
//!
//! Every key is optional; a missing key takes the built-in default.
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 8888
//! backlog = 128
//! log_file = "wscast_server.log"
//! run_for_secs = 60
//! poll_timeout_ms = 100
//! write_timeout_ms = 5000
//! handshake_timeout_ms = 5000
//! read_buffer_size = 8000
//! handshake_read_limit = 4096
//! max_frame_len = 1048576
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::domain::config::{
    ServerConfig, DEFAULT_BACKLOG, DEFAULT_HOST, DEFAULT_LOG_FILE, DEFAULT_PORT,
};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid host address '{0}'")]
    InvalidHost(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// On-disk configuration, field-for-field overridable from the CLI.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_backlog")]
    pub backlog: u32,
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    /// Absent means run until cancelled.
    #[serde(default)]
    pub run_for_secs: Option<u64>,
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    #[serde(default = "default_handshake_read_limit")]
    pub handshake_read_limit: usize,
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_backlog() -> u32 {
    DEFAULT_BACKLOG
}
fn default_log_file() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_FILE)
}
fn default_poll_timeout_ms() -> u64 {
    ServerConfig::default().poll_timeout.as_millis() as u64
}
fn default_write_timeout_ms() -> u64 {
    ServerConfig::default().write_timeout.as_millis() as u64
}
fn default_handshake_timeout_ms() -> u64 {
    ServerConfig::default().handshake_timeout.as_millis() as u64
}
fn default_read_buffer_size() -> usize {
    ServerConfig::default().read_buffer_size
}
fn default_handshake_read_limit() -> usize {
    ServerConfig::default().handshake_read_limit
}
fn default_max_frame_len() -> usize {
    ServerConfig::default().max_frame_len
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            backlog: default_backlog(),
            log_file: default_log_file(),
            run_for_secs: None,
            poll_timeout_ms: default_poll_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            read_buffer_size: default_read_buffer_size(),
            handshake_read_limit: default_handshake_read_limit(),
            max_frame_len: default_max_frame_len(),
        }
    }
}

impl FileConfig {
    /// Reads and parses `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Parse`] for invalid TOML or unknown keys.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parses TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed input.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Validates the values and converts them into a [`ServerConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidHost`] if `host` is not an IP address, or
    /// [`ConfigError::Zero`] for a zero-sized buffer or zero timeout.
    pub fn into_server_config(self) -> Result<ServerConfig, ConfigError> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| ConfigError::InvalidHost(self.host.clone()))?;

        for (name, value) in [
            ("poll_timeout_ms", self.poll_timeout_ms),
            ("write_timeout_ms", self.write_timeout_ms),
            ("handshake_timeout_ms", self.handshake_timeout_ms),
            ("read_buffer_size", self.read_buffer_size as u64),
            ("handshake_read_limit", self.handshake_read_limit as u64),
            ("max_frame_len", self.max_frame_len as u64),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero(name));
            }
        }

        Ok(ServerConfig {
            bind_addr: SocketAddr::new(ip, self.port),
            backlog: self.backlog,
            poll_timeout: Duration::from_millis(self.poll_timeout_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            read_buffer_size: self.read_buffer_size,
            handshake_read_limit: self.handshake_read_limit,
            max_frame_len: self.max_frame_len,
            run_for: self.run_for_secs.map(Duration::from_secs),
            log_file: self.log_file,
        })
    }
}
