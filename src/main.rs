//! LiteDB Server — path-addressed commands over framed TCP.
//!
//! Usage:
//!   litedb                              # 127.0.0.1:9999
//!   litedb --port 0                     # OS-assigned port
//!   litedb --verbose --log-file srv.log # Debug logging to a file

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use litedb_handlers::{CollectionStore, collection_routes};
use litedb_protocol::DEFAULT_MAX_FRAME_LENGTH;
use litedb_server::Server;
use litedb_transport::TransportConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "litedb", about = "LiteDB Server: command router over TCP")]
struct Cli {
    /// Port to listen on (0 for OS-assigned)
    #[arg(long, default_value = "9999")]
    port: u16,

    /// Hostname to bind to
    #[arg(long, default_value = "127.0.0.1")]
    hostname: String,

    /// Maximum concurrent connections (unlimited if omitted)
    #[arg(long)]
    max_connections: Option<usize>,

    /// Largest accepted frame, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_LENGTH)]
    max_frame_length: usize,

    /// How long shutdown waits for in-flight commands, in milliseconds
    #[arg(long, default_value = "5000")]
    shutdown_grace_ms: u64,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Write logs to a file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn init_tracing(cli: &Cli) -> anyhow::Result<()> {
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    match &cli.log_file {
        Some(log_path) => {
            if let Some(parent) = log_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_path)
                .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .init();

            eprintln!("Logging to {}", log_path.display());
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    let config = TransportConfig {
        hostname: cli.hostname.clone(),
        port: cli.port,
        max_connections: cli.max_connections,
        max_frame_length: cli.max_frame_length,
        shutdown_grace: Duration::from_millis(cli.shutdown_grace_ms),
    };

    let store = Arc::new(CollectionStore::new());
    let server = Server::new(config, collection_routes(store)).context("Invalid route table")?;
    let running = server.run().await.context("Failed to start server")?;

    println!();
    println!("  LiteDB Server");
    println!("  Listening:  {}", running.local_addr());
    println!("  Framing:    4-byte big-endian length prefix, max {} bytes", cli.max_frame_length);
    println!();
    println!("  Press Ctrl+C to stop.");
    println!();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    info!("Shutdown requested");
    running.stop().await;
    println!("  Server stopped.");
    Ok(())
}
