//! # wscast-core
//!
//! Socket-free building blocks of the wscast broadcast server.
//!
//! - **`protocol`** – How bytes travel over the network: the RFC 6455 frame
//!   codec and the opening-handshake text transformations.
//!
//! - **`domain`** – Connection identity and the explicit
//!   `Connecting → Open → Closed` lifecycle.
//!
//! Nothing here performs I/O, so everything can be tested with plain byte
//! slices and strings.

pub mod domain;
pub mod protocol;

pub use domain::connection::{ConnectionId, ConnectionState, TransitionError};
pub use protocol::frame::{decode, decode_frame, encode, FrameError, Opcode};
pub use protocol::handshake::{accept_key, HandshakeError};
