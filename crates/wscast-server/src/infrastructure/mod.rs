//! Infrastructure layer for wscast-server.
//!
//! Everything that touches sockets or files:
//!
//! - Binding the listening socket
//! - Performing the WebSocket opening handshake
//! - Keeping the registry of open peers and writing frames to them
//! - Running the broadcast loop
//! - Appending to the error log file
//! - Loading the optional TOML config file

pub mod config_file;
pub mod error_log;
pub mod listener;
pub mod negotiator;
pub mod registry;
pub mod server;

pub use server::{Server, ServerStats, StartupError};
