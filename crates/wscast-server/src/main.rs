//! Entry point for the wscast broadcast server.
//!
//! # Usage
//!
//! ```text
//! wscast-server [OPTIONS]
//!
//! Options:
//!   --config   <PATH>  TOML config file
//!   --host     <IP>    Listen address         [default: 127.0.0.1]
//!   --port     <PORT>  Listen port            [default: 8888]
//!   --backlog  <N>     Listen backlog         [default: 128]
//!   --log-file <PATH>  Error log file         [default: wscast_server.log]
//!   --run-for  <SECS>  Stop after SECS        [default: run until Ctrl+C]
//! ```
//!
//! Every option can also be set through the matching `WSCAST_*` environment
//! variable.  Precedence: CLI flag, then environment, then config file, then
//! built-in default.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wscast_server::domain::{ExecutionContext, ServerConfig};
use wscast_server::infrastructure::config_file::FileConfig;
use wscast_server::infrastructure::Server;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Single-process WebSocket broadcast server.
///
/// Relays every message a connected peer sends to all other peers.
#[derive(Debug, Parser)]
#[command(name = "wscast-server", version)]
struct Cli {
    /// TOML config file.  Flags given on the command line take precedence.
    #[arg(long, env = "WSCAST_CONFIG")]
    config: Option<PathBuf>,

    /// IP address to listen on.
    #[arg(long, env = "WSCAST_HOST")]
    host: Option<String>,

    /// TCP port to listen on.
    #[arg(long, env = "WSCAST_PORT")]
    port: Option<u16>,

    /// Pending-connection backlog.
    #[arg(long, env = "WSCAST_BACKLOG")]
    backlog: Option<u32>,

    /// Error log file; relative paths are resolved next to the executable.
    #[arg(long, env = "WSCAST_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Stop serving after this many seconds.
    #[arg(long, env = "WSCAST_RUN_FOR")]
    run_for: Option<u64>,
}

impl Cli {
    /// Merges the config file (if any) with the CLI overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed, or if the
    /// resulting values are invalid.
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let mut file = match &self.config {
            Some(path) => FileConfig::load(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?,
            None => FileConfig::default(),
        };

        if let Some(host) = self.host {
            file.host = host;
        }
        if let Some(port) = self.port {
            file.port = port;
        }
        if let Some(backlog) = self.backlog {
            file.backlog = backlog;
        }
        if let Some(log_file) = self.log_file {
            file.log_file = log_file;
        }
        if self.run_for.is_some() {
            file.run_for_secs = self.run_for;
        }

        file.into_server_config().context("invalid server configuration")
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// The loop is single-task by construction, so a current-thread runtime is
/// all it needs.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Cli::parse().into_server_config()?;
    info!(
        "wscast server starting: addr={}, log={}",
        config.bind_addr,
        config.log_file.display()
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                on_signal.cancel();
            }
            Err(e) => tracing::error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    let server = Server::bind(config, ExecutionContext::CommandLine, cancel)
        .context("server startup failed")?;
    let stats = server.run().await;

    info!(
        "wscast server stopped: {} peers served, {} messages relayed",
        stats.accepted, stats.messages_relayed
    );
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
