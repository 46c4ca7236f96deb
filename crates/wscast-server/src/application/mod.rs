//! Application layer for wscast-server.
//!
//! Socket-free decisions the broadcast loop delegates to: given a decoded
//! inbound frame, what goes out and to whom.

pub mod relay;

pub use relay::{plan, RelayAction};
