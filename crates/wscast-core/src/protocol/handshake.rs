//! Opening-handshake text transformations (RFC 6455 §4.2).
//!
//! These functions operate on already-received request text and return the
//! response text; reading from and writing to the socket is the caller's job.
//!
//! ```text
//! GET /chat HTTP/1.1
//! Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==      ─┐
//!                                                   │ SHA-1(key + GUID), base64
//! HTTP/1.1 101 Switching Protocols                  │
//! Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo= ◄┘
//! ```

use base64::prelude::{Engine as _, BASE64_STANDARD};
use sha1::{Digest, Sha1};
use thiserror::Error;

/// Fixed GUID appended to the client key before hashing.
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Header carrying the client's nonce.
pub const KEY_HEADER: &str = "Sec-WebSocket-Key";

/// Byte sequence terminating the HTTP request head.
pub const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Errors from interpreting a handshake request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    /// No non-empty `Sec-WebSocket-Key` header was present.
    #[error("Sec-WebSocket-Key not found in headers")]
    MissingKey,
}

/// Finds the `Sec-WebSocket-Key` value in a raw HTTP request.
///
/// The request is split on CRLF; the first header whose name matches
/// (ASCII case-insensitively) is split on its first `:` and the value trimmed.
///
/// # Errors
///
/// Returns [`HandshakeError::MissingKey`] if the header is absent or empty.
pub fn extract_key(request: &str) -> Result<&str, HandshakeError> {
    request
        .split("\r\n")
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case(KEY_HEADER))
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
        .ok_or(HandshakeError::MissingKey)
}

/// Computes `base64(SHA-1(key + GUID))`.
///
/// # Examples
///
/// ```rust
/// use wscast_core::protocol::handshake::accept_key;
///
/// assert_eq!(accept_key("dGhlIHNhbXBsZSBub25jZQ=="), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    BASE64_STANDARD.encode(hasher.finalize())
}

/// Renders the fixed `101 Switching Protocols` response.
pub fn upgrade_response(accept: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\r\n"
    )
}

/// Full text path: request in, response out.
///
/// # Errors
///
/// Returns [`HandshakeError::MissingKey`] if the request carries no key.
pub fn respond(request: &str) -> Result<String, HandshakeError> {
    let key = extract_key(request)?;
    Ok(upgrade_response(&accept_key(key)))
}

/// Length of the request head (terminator included) once `buf` holds all of
/// it, or `None` while more bytes are needed.
pub fn head_len(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|window| window == HEADER_TERMINATOR)
        .map(|pos| pos + HEADER_TERMINATOR.len())
}
