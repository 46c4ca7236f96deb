//! Connection identity and lifecycle state machine.
//!
//! ```text
//!   Connecting ──handshake ok──► Open ──write/read failure──► Closed
//!       │                                                      ▲
//!       └──────────────handshake failed────────────────────────┘
//! ```
//!
//! `Closed` is terminal.  Keeping the state as an explicit value (instead of
//! inferring it from registry membership) lets the transitions be tested
//! without any sockets.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Unique identity of one accepted TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Eight hex digits are plenty to tell peers apart in log lines.
        let simple = self.0.simple().to_string();
        f.write_str(&simple[..8])
    }
}

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Accepted; handshake not yet attempted or still in progress.
    #[default]
    Connecting,
    /// Handshake succeeded; the connection is a broadcast peer.
    Open,
    /// Removed; no further writes may be attempted.
    Closed,
}

/// Attempted an illegal state change.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("illegal connection transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

impl ConnectionState {
    /// `Connecting → Open` after a successful handshake write.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] from any state other than `Connecting`.
    pub fn open(self) -> Result<Self, TransitionError> {
        match self {
            ConnectionState::Connecting => Ok(ConnectionState::Open),
            from => Err(TransitionError {
                from,
                to: ConnectionState::Open,
            }),
        }
    }

    /// `Connecting | Open → Closed`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] if the connection is already closed.
    pub fn close(self) -> Result<Self, TransitionError> {
        match self {
            ConnectionState::Connecting | ConnectionState::Open => Ok(ConnectionState::Closed),
            ConnectionState::Closed => Err(TransitionError {
                from: ConnectionState::Closed,
                to: ConnectionState::Closed,
            }),
        }
    }

    /// Only open connections may be written to.
    pub fn accepts_writes(self) -> bool {
        self == ConnectionState::Open
    }
}
