//! Domain layer for wscast-server.
//!
//! Plain configuration and invocation types; no sockets, files or async.

pub mod config;
pub mod context;

pub use config::ServerConfig;
pub use context::ExecutionContext;
