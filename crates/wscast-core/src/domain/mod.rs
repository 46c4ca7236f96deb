//! Domain types with no I/O.

pub mod connection;

pub use connection::{ConnectionId, ConnectionState, TransitionError};
