//! The broadcast loop.
//!
//! A [`Server`] owns its configuration, listening socket, peer registry and
//! error log.  [`Server::run`] drives a single task that, on each iteration,
//! waits (bounded by `poll_timeout`) for the first of:
//!
//! 1. cancellation or the optional run deadline → leave the loop;
//! 2. a finished handshake → admit to the registry (or drop on failure);
//! 3. a new TCP connection → start its handshake;
//! 4. readable peers → read, decode, re-encode, fan out to all other peers.
//!
//! Handshakes in flight are futures polled by the loop itself, so a client
//! that connects and stays silent holds only its own slot until
//! `handshake_timeout`.  Registry changes happen only in the loop body.
//!
//! Per-connection failures (handshake, read, write) drop only that
//! connection and are recorded in the error log file.  On exit pending
//! handshakes are abandoned, and the listener and all peers are released by
//! [`Server::terminate`].

use std::net::SocketAddr;

use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{FuturesUnordered, StreamExt};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use wscast_core::domain::connection::ConnectionId;

use crate::application::relay::{plan, RelayAction};
use crate::domain::{ExecutionContext, ServerConfig};
use crate::infrastructure::error_log::{self, resolve_log_path, ErrorLog};
use crate::infrastructure::listener::{self, ListenerError};
use crate::infrastructure::negotiator::{negotiate, HandshakeLimits, NegotiationError};
use crate::infrastructure::registry::{Connection, ConnectionRegistry};

/// Fatal startup failures.  Nothing is served when one of these occurs.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("the server can only be started from the command line (context: {0})")]
    NotCommandLine(ExecutionContext),

    #[error("cannot write to log file {path}: {source}")]
    LogFile {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// Counters reported when the loop exits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServerStats {
    pub accepted: u64,
    pub rejected: u64,
    pub messages_relayed: u64,
    pub peers_dropped: u64,
}

/// Result of one handshake: the connection and the bytes read past the
/// request head.
type Negotiated = (Connection<TcpStream>, Result<Vec<u8>, NegotiationError>);

/// What woke the loop.
enum LoopEvent {
    Stop,
    Negotiated(Negotiated),
    Accepted(std::io::Result<(TcpStream, SocketAddr)>),
    Readable(Vec<ConnectionId>),
    Idle,
}

/// Runs the handshake on a connection it owns until it finishes.
fn handshake(
    mut conn: Connection<TcpStream>,
    limits: HandshakeLimits,
) -> BoxFuture<'static, Negotiated> {
    async move {
        let result = negotiate(conn.stream_mut(), limits).await;
        (conn, result)
    }
    .boxed()
}

/// A bound broadcast server.
pub struct Server {
    config: ServerConfig,
    listener: Option<TcpListener>,
    registry: ConnectionRegistry<TcpStream>,
    error_log: ErrorLog,
    cancel: CancellationToken,
    read_buf: Vec<u8>,
    stats: ServerStats,
}

impl Server {
    /// Validates the invocation context, opens the error log and binds the
    /// listening socket.
    ///
    /// The context check and the log check both run before any socket is
    /// created.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError`]; the failure has already been reported on the
    /// console sink.
    pub fn bind(
        config: ServerConfig,
        context: ExecutionContext,
        cancel: CancellationToken,
    ) -> Result<Self, StartupError> {
        if !context.is_command_line() {
            let err = StartupError::NotCommandLine(context);
            error_log::console(&err);
            return Err(err);
        }

        let log_path = resolve_log_path(&config.log_file);
        let error_log = ErrorLog::open(&log_path).map_err(|source| {
            let err = StartupError::LogFile {
                path: log_path.clone(),
                source,
            };
            error_log::console(&err);
            err
        })?;

        let listener = listener::bind(config.bind_addr, config.backlog).map_err(|e| {
            error_log::console(&e);
            StartupError::from(e)
        })?;

        Ok(Self {
            read_buf: vec![0u8; config.read_buffer_size.max(1)],
            config,
            listener: Some(listener),
            registry: ConnectionRegistry::new(),
            error_log,
            cancel,
            stats: ServerStats::default(),
        })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        match &self.listener {
            Some(listener) => listener.local_addr(),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "listener already terminated",
            )),
        }
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    pub fn stats(&self) -> ServerStats {
        self.stats
    }

    /// Runs the loop until cancelled (or until `run_for` elapses), then
    /// terminates.
    pub async fn run(mut self) -> ServerStats {
        let deadline = self.config.run_for.map(|d| Instant::now() + d);
        let run_limit = async move {
            match deadline {
                Some(at) => sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(run_limit);

        let mut handshakes: FuturesUnordered<BoxFuture<'static, Negotiated>> =
            FuturesUnordered::new();
        let limits = HandshakeLimits {
            max_request_len: self.config.handshake_read_limit,
            timeout: self.config.handshake_timeout,
        };

        info!("broadcast loop started");
        loop {
            let event = {
                let Some(listener) = self.listener.as_ref() else {
                    break;
                };
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => LoopEvent::Stop,
                    _ = &mut run_limit => {
                        info!("run duration elapsed");
                        LoopEvent::Stop
                    }
                    Some(done) = handshakes.next(), if !handshakes.is_empty() => {
                        LoopEvent::Negotiated(done)
                    }
                    accepted = listener.accept() => LoopEvent::Accepted(accepted),
                    ready = timeout(self.config.poll_timeout, self.registry.wait_readable()) => {
                        match ready {
                            Ok(ids) => LoopEvent::Readable(ids),
                            Err(_) => LoopEvent::Idle,
                        }
                    }
                }
            };

            match event {
                LoopEvent::Stop => break,
                LoopEvent::Negotiated((conn, result)) => self.on_negotiated(conn, result).await,
                LoopEvent::Accepted(Ok((stream, peer))) => {
                    debug!("accepted TCP connection from {peer}");
                    handshakes.push(handshake(Connection::new(stream, peer), limits));
                }
                LoopEvent::Accepted(Err(e)) => {
                    // Transient (e.g. too many open files); keep serving.
                    warn!("accept error: {e}");
                }
                LoopEvent::Readable(ids) => {
                    for id in ids {
                        self.on_readable(id).await;
                    }
                }
                LoopEvent::Idle => {}
            }
        }

        if !handshakes.is_empty() {
            debug!("abandoning {} pending handshakes", handshakes.len());
        }
        drop(handshakes);
        self.terminate();
        info!("broadcast loop stopped: {:?}", self.stats);
        self.stats
    }

    /// Releases every peer and the listening socket.
    ///
    /// Idempotent: later calls find nothing left to release.
    pub fn terminate(&mut self) {
        self.registry.clear();
        if let Some(listener) = self.listener.take() {
            let addr = listener.local_addr().ok();
            drop(listener);
            match addr {
                Some(addr) => info!("listener on {addr} closed"),
                None => info!("listener closed"),
            }
        }
    }

    /// Admits a connection whose handshake succeeded.
    ///
    /// A failed handshake drops only this connection.
    async fn on_negotiated(
        &mut self,
        mut conn: Connection<TcpStream>,
        result: Result<Vec<u8>, NegotiationError>,
    ) {
        let peer = conn.peer();
        let leftover = match result {
            Ok(leftover) => leftover,
            Err(e) => {
                let _ = conn.close();
                self.stats.rejected += 1;
                self.error_log
                    .file(format_args!("handshake with {peer} failed: {e}"));
                return;
            }
        };

        match self.registry.admit(conn) {
            Ok(id) => {
                self.stats.accepted += 1;
                info!("peer {id} connected from {peer}");
                if !leftover.is_empty() {
                    self.relay_bytes(id, leftover).await;
                }
            }
            Err(e) => {
                self.stats.rejected += 1;
                self.error_log
                    .file(format_args!("cannot register {peer}: {e}"));
            }
        }
    }

    /// Reads whatever `id` has pending and relays the complete frames.
    async fn on_readable(&mut self, id: ConnectionId) {
        if !self.registry.contains(id) {
            // Dropped earlier in this iteration.
            return;
        }

        let n = match self.registry.try_read(id, &mut self.read_buf) {
            Ok(0) => {
                self.drop_peer(id, "connection closed by peer");
                return;
            }
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return,
            Err(e) => {
                self.drop_peer(id, format_args!("read failed: {e}"));
                return;
            }
        };

        let bytes = self.read_buf[..n].to_vec();
        self.relay_bytes(id, bytes).await;
    }

    /// Decodes `bytes` from `sender` and broadcasts each resulting message.
    async fn relay_bytes(&mut self, sender: ConnectionId, bytes: Vec<u8>) {
        let max_frame_len = self.config.max_frame_len;
        let frames = match self.registry.get_mut(sender) {
            Some(conn) => conn.ingest(&bytes, max_frame_len),
            None => return,
        };
        let frames = match frames {
            Ok(frames) => frames,
            Err(e) => {
                self.drop_peer(sender, e);
                return;
            }
        };

        for frame in frames {
            match plan(&frame) {
                Ok(RelayAction::Broadcast(outbound)) => {
                    let fan_out = self
                        .registry
                        .broadcast(
                            sender,
                            &outbound,
                            self.config.write_timeout,
                            &self.error_log,
                        )
                        .await;
                    self.stats.messages_relayed += 1;
                    self.stats.peers_dropped += fan_out.dropped.len() as u64;
                }
                Ok(RelayAction::Skip) => {
                    debug!("peer {sender}: {:?} frame not relayed", frame.opcode);
                }
                Ok(RelayAction::CloseSender) => {
                    self.drop_peer(sender, "close frame received");
                    return;
                }
                Err(e) => {
                    self.error_log
                        .file(format_args!("peer {sender}: cannot re-encode message: {e}"));
                }
            }
        }
    }

    fn drop_peer(&mut self, id: ConnectionId, reason: impl std::fmt::Display) {
        if let Some(conn) = self.registry.remove(id) {
            self.stats.peers_dropped += 1;
            self.error_log
                .file(format_args!("peer {id} ({}) dropped: {reason}", conn.peer()));
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_config(dir: &tempfile::TempDir) -> ServerConfig {
        ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_file: dir.path().join("test.log"),
            poll_timeout: Duration::from_millis(20),
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_bind_outside_command_line_creates_no_socket() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);

        let result = Server::bind(
            config,
            ExecutionContext::Other("embedded".into()),
            CancellationToken::new(),
        );

        assert!(matches!(result, Err(StartupError::NotCommandLine(_))));
        // Rejected before the log check, so no log file was touched either.
        assert!(!dir.path().join("test.log").exists());
    }

    #[tokio::test]
    async fn test_bind_unwritable_log_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            log_file: dir.path().join("missing").join("test.log"),
            ..test_config(&dir)
        };

        let result = Server::bind(config, ExecutionContext::CommandLine, CancellationToken::new());

        assert!(matches!(result, Err(StartupError::LogFile { .. })));
    }

    #[tokio::test]
    async fn test_bind_port_in_use_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let first = Server::bind(
            test_config(&dir),
            ExecutionContext::CommandLine,
            CancellationToken::new(),
        )
        .unwrap();
        let config = ServerConfig {
            bind_addr: first.local_addr().unwrap(),
            ..test_config(&dir)
        };

        let result = Server::bind(config, ExecutionContext::CommandLine, CancellationToken::new());

        assert!(matches!(
            result,
            Err(StartupError::Listener(ListenerError::Bind { .. }))
        ));
    }

    #[tokio::test]
    async fn test_fresh_server_has_no_peers() {
        let dir = tempfile::tempdir().unwrap();
        let server = Server::bind(
            test_config(&dir),
            ExecutionContext::CommandLine,
            CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(server.connection_count(), 0);
        assert_eq!(server.stats(), ServerStats::default());
        assert!(dir.path().join("test.log").exists());
    }

    #[tokio::test]
    async fn test_terminate_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = Server::bind(
            test_config(&dir),
            ExecutionContext::CommandLine,
            CancellationToken::new(),
        )
        .unwrap();
        let addr = server.local_addr().unwrap();

        server.terminate();
        server.terminate();

        assert!(server.local_addr().is_err());
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_run_returns_when_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let server =
            Server::bind(test_config(&dir), ExecutionContext::CommandLine, cancel.clone()).unwrap();

        cancel.cancel();
        let stats = timeout(Duration::from_secs(5), server.run()).await.unwrap();

        assert_eq!(stats, ServerStats::default());
    }

    #[tokio::test]
    async fn test_run_stops_after_run_duration() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            run_for: Some(Duration::from_millis(100)),
            ..test_config(&dir)
        };
        let server =
            Server::bind(config, ExecutionContext::CommandLine, CancellationToken::new()).unwrap();

        let result = timeout(Duration::from_secs(5), server.run()).await;

        assert!(result.is_ok(), "loop must exit once run_for elapses");
    }
}
