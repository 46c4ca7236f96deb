//! Listening socket creation.
//!
//! Uses `tokio::net::TcpSocket` rather than `TcpListener::bind` so the
//! backlog is explicit.  Tokio sockets are non-blocking from creation, so
//! there is no separate "set non-blocking" step that could fail.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::{TcpListener, TcpSocket};
use tracing::info;

/// Failures while creating the listening socket.  All are fatal to startup.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("socket creation failed: {0}")]
    SocketCreation(#[source] io::Error),

    #[error("bind failed on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("listen failed on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Creates a TCP socket for `addr`'s family, binds it and starts listening.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns the [`ListenerError`] variant naming the step that failed.
pub fn bind(addr: SocketAddr, backlog: u32) -> Result<TcpListener, ListenerError> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(ListenerError::SocketCreation)?;

    // Restarting right after a shutdown must not trip over TIME_WAIT.
    socket
        .set_reuseaddr(true)
        .map_err(ListenerError::SocketCreation)?;

    socket
        .bind(addr)
        .map_err(|source| ListenerError::Bind { addr, source })?;

    let listener = socket
        .listen(backlog)
        .map_err(|source| ListenerError::Listen { addr, source })?;

    info!("listening on {addr} (backlog {backlog})");
    Ok(listener)
}
