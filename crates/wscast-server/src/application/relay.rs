//! Decides what the server does with each frame a peer sends.
//!
//! The broadcast loop decodes inbound frames and asks [`plan`] what to do with
//! each one.  Keeping this decision free of sockets lets every opcode path be
//! tested with plain values.

use wscast_core::protocol::frame::{encode, DecodedFrame, FrameError, Opcode};

/// What to do with one decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayAction {
    /// Write this server frame to every peer except the sender.
    Broadcast(Vec<u8>),
    /// Nothing to forward (empty payload, ping, pong, reserved opcode).
    Skip,
    /// The sender asked to close; drop it without a closing handshake.
    CloseSender,
}

/// Maps an inbound frame to a [`RelayAction`].
///
/// Data frames (text, binary, continuation) are re-encoded as a single text
/// frame.  Control frames are never forwarded.
///
/// # Errors
///
/// Returns [`FrameError::PayloadTooLarge`] if the payload cannot be encoded.
pub fn plan(frame: &DecodedFrame) -> Result<RelayAction, FrameError> {
    match frame.opcode {
        Opcode::Close => Ok(RelayAction::CloseSender),
        op if op.is_control() => Ok(RelayAction::Skip),
        Opcode::Reserved(_) => Ok(RelayAction::Skip),
        _ => {
            let outbound = encode(&frame.payload)?;
            if outbound.is_empty() {
                Ok(RelayAction::Skip)
            } else {
                Ok(RelayAction::Broadcast(outbound))
            }
        }
    }
}
