//! Opening handshake over a live stream.
//!
//! Reads the HTTP upgrade request until the blank line that ends its head,
//! derives the accept key with [`wscast_core::protocol::handshake`], and
//! writes the `101 Switching Protocols` response.  The whole exchange is
//! bounded by a byte limit and a timeout so one silent client cannot hold the
//! broadcast loop indefinitely.

use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use wscast_core::protocol::handshake::{self, HandshakeError};

/// Why a handshake did not complete.  Each one drops only that connection.
#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error("peer closed the connection before completing the handshake")]
    ConnectionClosed,

    #[error("handshake request exceeds {limit} bytes")]
    RequestTooLarge { limit: usize },

    #[error("handshake not completed within {0:?}")]
    Timeout(Duration),

    #[error("socket error during handshake: {0}")]
    Io(#[from] io::Error),
}

/// Limits applied to one handshake.
#[derive(Debug, Clone, Copy)]
pub struct HandshakeLimits {
    pub max_request_len: usize,
    pub timeout: Duration,
}

/// Performs the server side of the opening handshake on `stream`.
///
/// Returns any bytes that arrived after the request head; they belong to the
/// first WebSocket frame and must be fed to the connection's inbound buffer.
///
/// # Errors
///
/// Returns [`NegotiationError::Handshake`] wrapping
/// [`HandshakeError::MissingKey`] when the request has no key, or another
/// variant for I/O failure, early close, oversize request or timeout.
pub async fn negotiate<S>(
    stream: &mut S,
    limits: HandshakeLimits,
) -> Result<Vec<u8>, NegotiationError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    timeout(limits.timeout, exchange(stream, limits.max_request_len))
        .await
        .map_err(|_| NegotiationError::Timeout(limits.timeout))?
}

async fn exchange<S>(stream: &mut S, max_request_len: usize) -> Result<Vec<u8>, NegotiationError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (head, leftover) = read_request_head(stream, max_request_len).await?;
    let response = handshake::respond(&String::from_utf8_lossy(&head))?;
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    Ok(leftover)
}

/// Reads until `\r\n\r\n`, returning `(head, bytes after head)`.
async fn read_request_head<S>(
    stream: &mut S,
    limit: usize,
) -> Result<(Vec<u8>, Vec<u8>), NegotiationError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(limit.min(4096));
    let mut chunk = [0u8; 1024];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(NegotiationError::ConnectionClosed);
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(len) = handshake::head_len(&buf) {
            let leftover = buf.split_off(len);
            return Ok((buf, leftover));
        }
        if buf.len() >= limit {
            return Err(NegotiationError::RequestTooLarge { limit });
        }
    }
}
