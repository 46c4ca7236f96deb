//! wscast-server library crate.
//!
//! A single-process WebSocket broadcast server: every text message a peer
//! sends is re-framed and delivered to all other connected peers.
//!
//! ```text
//! Browser ──ws──┐
//! Browser ──ws──┼──► [wscast-server]
//! Browser ──ws──┘      ├── domain/          ServerConfig, ExecutionContext
//!                      ├── application/     what to do with each inbound frame
//!                      └── infrastructure/
//!                            ├── listener     bind + listen
//!                            ├── negotiator   HTTP upgrade handshake
//!                            ├── registry     open peers, fan-out writes
//!                            ├── server       the broadcast loop
//!                            ├── error_log    console / file error sinks
//!                            └── config_file  optional TOML settings
//! ```
//!
//! Frame encoding and the handshake arithmetic live in `wscast-core`.

pub mod application;
pub mod domain;
pub mod infrastructure;
