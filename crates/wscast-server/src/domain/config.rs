//! Server configuration types.
//!
//! [`ServerConfig`] is the single source of truth for all runtime settings.
//! It is built once at startup (from CLI arguments and an optional TOML file)
//! and owned by the server instance; nothing reads settings from global state.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default listening host.
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default listening port.
pub const DEFAULT_PORT: u16 = 8888;
/// Default pending-connection backlog passed to `listen(2)`.
pub const DEFAULT_BACKLOG: u32 = 128;
/// Default error log file name, resolved next to the executable.
pub const DEFAULT_LOG_FILE: &str = "wscast_server.log";

/// All runtime configuration for the broadcast server.
///
/// # Example
///
/// ```rust
/// use wscast_server::domain::ServerConfig;
///
/// let cfg = ServerConfig::default();
/// assert_eq!(cfg.bind_addr.port(), 8888);
/// assert!(cfg.run_for.is_none());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Address the listening socket binds to.
    pub bind_addr: SocketAddr,

    /// Maximum number of pending connections queued by the kernel.
    pub backlog: u32,

    /// Upper bound on one readiness wait; the loop wakes at least this often.
    pub poll_timeout: Duration,

    /// A broadcast write that takes longer than this drops the peer.
    pub write_timeout: Duration,

    /// Time allowed for a new connection to deliver its upgrade request and
    /// receive the response.
    pub handshake_timeout: Duration,

    /// Size of the buffer used for each read from a peer.
    pub read_buffer_size: usize,

    /// Largest accepted upgrade request head, in bytes.
    pub handshake_read_limit: usize,

    /// Largest accepted client frame (header + payload).  A peer announcing a
    /// bigger frame is dropped instead of buffered.
    pub max_frame_len: usize,

    /// Stop the loop after this long.  `None` runs until cancelled.
    pub run_for: Option<Duration>,

    /// Error log file.  Relative paths are resolved against the directory of
    /// the server executable.
    pub log_file: PathBuf,
}

impl Default for ServerConfig {
    /// | Field                | Default               |
    /// |----------------------|-----------------------|
    /// | bind_addr            | `127.0.0.1:8888`      |
    /// | backlog              | 128                   |
    /// | poll_timeout         | 100 ms                |
    /// | write_timeout        | 5 s                   |
    /// | handshake_timeout    | 5 s                   |
    /// | read_buffer_size     | 8000                  |
    /// | handshake_read_limit | 4096                  |
    /// | max_frame_len        | 1 MiB                 |
    /// | run_for              | none                  |
    /// | log_file             | `wscast_server.log`   |
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            backlog: DEFAULT_BACKLOG,
            poll_timeout: Duration::from_millis(100),
            write_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(5),
            read_buffer_size: 8000,
            handshake_read_limit: 4096,
            max_frame_len: 1024 * 1024,
            run_for: None,
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
