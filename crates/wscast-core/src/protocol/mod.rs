//! Wire protocol: frame codec and handshake.

pub mod frame;
pub mod handshake;

pub use frame::{decode, decode_frame, encode, DecodedFrame, FrameError, LengthForm, Opcode};
pub use handshake::{accept_key, extract_key, upgrade_response, HandshakeError};
