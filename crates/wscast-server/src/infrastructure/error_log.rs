//! Error sinks.
//!
//! Two independent destinations, chosen per call site:
//!
//! - **console**: startup failures.  Emitted through `tracing` at `error`
//!   level, so they reach stderr via the subscriber installed in `main.rs`.
//! - **file**: per-connection failures during steady-state operation.  One
//!   timestamped line is appended per error:
//!
//! ```text
//! date: 19.10.26 14:03:07	error: write to peer 3f2a9c1e (127.0.0.1:50312) failed: Broken pipe
//! ```
//!
//! No rotation, levels or buffering; each line is a separate append.
//!
//! The append is a blocking `std::fs` call made on the broadcast loop's task.
//! It runs only on a per-connection failure and writes one short line, and a
//! line is on disk by the time [`ErrorLog::file`] returns.

use std::fmt::Display;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{error, warn};

/// Timestamp layout of the file sink.
const TIMESTAMP_FORMAT: &str = "%d.%m.%y %H:%M:%S";

/// Reports a startup failure on the console.
pub fn console(message: impl Display) {
    error!("Socket error: {message}");
}

/// Append-only error log file.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: Option<PathBuf>,
}

impl ErrorLog {
    /// Opens (creating if needed) the log file at `path`.
    ///
    /// The file is opened once in append mode to prove it is writable, then
    /// closed again; every later entry reopens it.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file cannot be created or appended to.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path: Some(path) })
    }

    /// A log that only traces; nothing is written to disk.
    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Records a per-connection error.
    ///
    /// Failing to write the log line is reported on the console and otherwise
    /// ignored.
    pub fn file(&self, message: impl Display) {
        let message = message.to_string();
        warn!("{message}");

        let Some(path) = &self.path else {
            return;
        };
        let line = format_line(Local::now(), &message);
        if let Err(e) = append(path, &line) {
            console(format_args!("cannot append to {}: {e}", path.display()));
        }
    }
}

/// Resolves a relative log path against the directory of the running
/// executable.  Absolute paths are returned unchanged.
pub fn resolve_log_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .map(|dir| dir.join(path))
        .unwrap_or_else(|| path.to_path_buf())
}

/// Renders one log line, newline included.
pub fn format_line(at: DateTime<Local>, message: &str) -> String {
    format!("date: {}\terror: {message}\n", at.format(TIMESTAMP_FORMAT))
}

fn append(path: &Path, line: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())
}
