//! App gate server.
//!
//! ```text
//!     Client ──▶ request id ──▶ gate middleware ──┬──▶ upstream (app requests)
//!                                  │              └──▶ 403 block page
//!                                  ▼
//!                           access log / metrics
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use app_gate::config::{load_config, watcher::ConfigWatcher, GateConfig};
use app_gate::lifecycle::{signals::shutdown_on_signal, Shutdown};
use app_gate::observability::{logging, metrics};
use app_gate::GateServer;

#[derive(Parser)]
#[command(name = "app-gate", version, about = "Serve content only to the official mobile app")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reload the gate settings when the configuration file changes.
    #[arg(long, requires = "config")]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GateConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!("app-gate v{} starting", env!("CARGO_PKG_VERSION"));

    if args.config.is_none() {
        tracing::warn!("No configuration file given; running with placeholder secrets");
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        replay_window_secs = config.gate.replay_window_secs,
        access_log = config.access_log.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // The watcher handle has to outlive the server.
    let (_watcher, config_updates) = match (&args.config, args.watch) {
        (Some(path), true) => {
            let (watcher, rx) = ConfigWatcher::new(path);
            (Some(watcher.spawn()?), rx)
        }
        _ => (None, mpsc::unbounded_channel().1),
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(shutdown_on_signal(shutdown));

    let server = GateServer::new(config)?;
    server.run(listener, config_updates, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
