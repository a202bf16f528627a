//! SparkKV - An In-Memory, TTL-Aware Key-Value Cache Server
//!
//! This is the main entry point for the SparkKV server.
//! It loads the configuration, binds the transport, and serves connections
//! until Ctrl+C or SIGTERM.

use anyhow::Context;
use clap::Parser;
use sparkkv::{Server, ServerConfig, TcpTransport};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// In-memory, TTL-aware key-value cache server speaking RESP3.
#[derive(Debug, Parser)]
#[command(name = "sparkkv", version, about)]
struct Cli {
    /// Path to the JSON configuration file (missing file means defaults)
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Host to bind to (overrides the config file)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<ServerConfig> {
        let mut config = ServerConfig::load(&self.config)
            .with_context(|| format!("loading {}", self.config.display()))?;

        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        Ok(config)
    }
}

fn print_banner(config: &ServerConfig, addr: std::net::SocketAddr) {
    println!(
        r#"
SparkKV v{} - In-Memory Key-Value Cache (RESP3, speaks as {} {})
──────────────────────────────────────────────────────────────
Server started on {}
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        sparkkv::VERSION,
        config.server_name,
        config.version,
        addr
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging: RUST_LOG wins over --log-level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .with_context(|| format!("invalid log level '{}'", cli.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = cli.load_config()?;

    let mut transport = TcpTransport::new(config.bind_address());
    let addr = transport
        .listen_and_accept()
        .await
        .with_context(|| format!("binding {}", config.bind_address()))?;

    print_banner(&config, addr);

    let server = Server::new(config);

    // Set up graceful shutdown
    let close = transport.close_handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, stopping server...");
        close.close();
    });

    server.serve(&mut transport).await;
    server.shutdown();

    let stats = server.stats();
    info!(
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        keys = server.storage().len(),
        "Server shutdown complete"
    );
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
