//! Registry of handshaked peers and the per-message fan-out.
//!
//! The registry is owned by the broadcast loop and mutated only from that
//! single task, so no locking is needed.  Every member is in the `Open`
//! state; removal transitions a connection to `Closed` and drops its socket,
//! which guarantees a removed peer never receives another write.
//!
//! Writes and frame buffering are generic over the stream type so the
//! fan-out can be exercised with scripted doubles.  Readiness polling and
//! non-blocking reads are specific to `TcpStream`.

use std::collections::HashMap;
use std::future::poll_fn;
use std::io;
use std::net::SocketAddr;
use std::task::Poll;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info};

use wscast_core::domain::connection::{ConnectionId, ConnectionState, TransitionError};
use wscast_core::protocol::frame::{decode_frame, peek_header, DecodedFrame, FrameError};

use crate::infrastructure::error_log::ErrorLog;

/// Registry membership errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("connection {0} is already registered")]
    Duplicate(ConnectionId),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Problems with a peer's inbound byte stream.  Each one drops the peer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InboundError {
    #[error("frame of {len} bytes exceeds the {max}-byte limit")]
    FrameTooLarge { len: usize, max: usize },

    #[error("malformed frame: {0}")]
    Malformed(#[from] FrameError),
}

// ── Connection ────────────────────────────────────────────────────────────────

/// One accepted socket plus its lifecycle state.
#[derive(Debug)]
pub struct Connection<S> {
    id: ConnectionId,
    peer: SocketAddr,
    state: ConnectionState,
    stream: S,
    /// Bytes received but not yet decoded into a complete frame.
    inbound: Vec<u8>,
}

impl<S> Connection<S> {
    /// Wraps a freshly accepted stream in the `Connecting` state.
    pub fn new(stream: S, peer: SocketAddr) -> Self {
        Self {
            id: ConnectionId::new(),
            peer,
            state: ConnectionState::Connecting,
            stream,
            inbound: Vec::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Marks a connection whose handshake failed (or that is being released)
    /// as closed.
    pub fn close(&mut self) -> Result<(), TransitionError> {
        self.state = self.state.close()?;
        Ok(())
    }

    /// Appends received bytes and returns every frame that is now complete.
    ///
    /// A partial trailing frame stays buffered for the next read.
    ///
    /// # Errors
    ///
    /// Returns [`InboundError::FrameTooLarge`] as soon as a header announces a
    /// frame longer than `max_frame_len`, without waiting for its payload, and
    /// [`InboundError::Malformed`] for a length no buffer could hold.
    pub fn ingest(
        &mut self,
        bytes: &[u8],
        max_frame_len: usize,
    ) -> Result<Vec<DecodedFrame>, InboundError> {
        self.inbound.extend_from_slice(bytes);
        let mut frames = Vec::new();
        let mut cursor = 0;

        loop {
            let pending = &self.inbound[cursor..];
            if pending.is_empty() {
                break;
            }
            match peek_header(pending) {
                Ok(header) => {
                    let len = header.frame_len()?;
                    if len > max_frame_len {
                        return Err(InboundError::FrameTooLarge {
                            len,
                            max: max_frame_len,
                        });
                    }
                }
                Err(FrameError::Incomplete { .. }) => break,
                Err(e) => return Err(e.into()),
            }
            match decode_frame(pending) {
                Ok(frame) => {
                    cursor += frame.consumed;
                    frames.push(frame);
                }
                Err(FrameError::Incomplete { .. }) => break,
                Err(e) => return Err(e.into()),
            }
        }

        self.inbound.drain(..cursor);
        Ok(frames)
    }
}

// ── Fan-out result ────────────────────────────────────────────────────────────

/// Outcome of writing one frame to every peer but the sender.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FanOut {
    pub delivered: Vec<ConnectionId>,
    pub dropped: Vec<ConnectionId>,
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// The set of open peers, keyed by identity.
#[derive(Debug)]
pub struct ConnectionRegistry<S> {
    peers: HashMap<ConnectionId, Connection<S>>,
}

impl<S> Default for ConnectionRegistry<S> {
    fn default() -> Self {
        Self {
            peers: HashMap::new(),
        }
    }
}

impl<S> ConnectionRegistry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.peers.contains_key(&id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection<S>> {
        self.peers.get_mut(&id)
    }

    /// Adds a handshaked connection, moving it `Connecting → Open`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if the identity is already
    /// present, or [`RegistryError::Transition`] if the connection is not in
    /// the `Connecting` state.
    pub fn admit(&mut self, mut conn: Connection<S>) -> Result<ConnectionId, RegistryError> {
        let id = conn.id;
        if self.peers.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        conn.state = conn.state.open()?;
        self.peers.insert(id, conn);
        info!("peer {id} joined ({} connected)", self.peers.len());
        Ok(id)
    }

    /// Removes a peer, moving it `Open → Closed` and releasing its socket.
    ///
    /// Returns the closed connection, or `None` if it was not registered.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection<S>> {
        let mut conn = self.peers.remove(&id)?;
        // Registry members are always Open, so closing cannot fail.
        let _ = conn.close();
        info!("peer {id} left ({} connected)", self.peers.len());
        Some(conn)
    }

    /// Closes and releases every peer.
    pub fn clear(&mut self) {
        for (_, mut conn) in self.peers.drain() {
            let _ = conn.close();
        }
    }
}

impl<S: AsyncWrite + Unpin> ConnectionRegistry<S> {
    /// Writes `frame` to every registered peer except `sender`.
    ///
    /// All writes share one deadline `write_timeout` from now, so a fan-out
    /// never holds the caller longer than that however many peers are slow.
    /// A peer whose write fails or is still pending at the deadline is
    /// removed immediately and the failure is recorded in `log`; the
    /// remaining peers are still written to.
    pub async fn broadcast(
        &mut self,
        sender: ConnectionId,
        frame: &[u8],
        write_timeout: Duration,
        log: &ErrorLog,
    ) -> FanOut {
        let mut fan_out = FanOut::default();
        let deadline = Instant::now() + write_timeout;
        let recipients: Vec<ConnectionId> =
            self.peers.keys().copied().filter(|id| *id != sender).collect();

        for id in recipients {
            let Some(conn) = self.peers.get_mut(&id) else {
                continue;
            };
            debug_assert!(conn.state.accepts_writes());

            let failure = match timeout_at(deadline, conn.stream.write_all(frame)).await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some(format!("fan-out deadline of {write_timeout:?} passed")),
            };

            match failure {
                None => fan_out.delivered.push(id),
                Some(reason) => {
                    let peer = conn.peer;
                    self.remove(id);
                    log.file(format_args!("write to peer {id} ({peer}) failed: {reason}"));
                    fan_out.dropped.push(id);
                }
            }
        }

        debug!(
            "frame of {} bytes from {sender}: {} delivered, {} dropped",
            frame.len(),
            fan_out.delivered.len(),
            fan_out.dropped.len()
        );
        fan_out
    }
}

impl ConnectionRegistry<TcpStream> {
    /// Waits until at least one peer has data (or EOF/error) pending and
    /// returns all peers that are ready at that moment.
    ///
    /// Never completes while the registry is empty; callers bound the wait
    /// with a timeout.
    pub async fn wait_readable(&self) -> Vec<ConnectionId> {
        poll_fn(|cx| {
            let ready: Vec<ConnectionId> = self
                .peers
                .iter()
                .filter(|(_, conn)| conn.stream.poll_read_ready(cx).is_ready())
                .map(|(id, _)| *id)
                .collect();
            if ready.is_empty() {
                Poll::Pending
            } else {
                Poll::Ready(ready)
            }
        })
        .await
    }

    /// Non-blocking read from one peer.
    ///
    /// # Errors
    ///
    /// Returns `WouldBlock` on spurious readiness, `NotFound` for an unknown
    /// peer, or the socket error.
    pub fn try_read(&mut self, id: ConnectionId, buf: &mut [u8]) -> io::Result<usize> {
        let conn = self
            .peers
            .get_mut(&id)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no peer {id}")))?;
        conn.stream.try_read(buf)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
