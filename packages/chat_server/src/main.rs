use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chat_core::Hub;
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

mod config;
mod render;
mod transport;

use crate::config::{DEFAULT_CONFIG_FILE, FileConfig, OutputFormat};

/// How long the hub gets to drain sessions after Ctrl+C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "chatd")]
#[command(about = "Multi-room chat broker speaking plain text over TCP", long_about = None)]
struct Cli {
    /// Config file (TOML)
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Address to bind (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Wire format for outbound events (overrides config)
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_directive = if cli.debug {
        "chatd=debug,chat_core=debug,info"
    } else {
        "chatd=info,chat_core=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let mut file_config: FileConfig = config::load_config(&cli.config)
        .extract()
        .with_context(|| format!("Invalid configuration in {}", cli.config.display()))?;
    if let Some(host) = cli.host {
        file_config.server.host = host;
    }
    if let Some(port) = cli.port {
        file_config.server.port = port;
    }
    if let Some(format) = cli.format {
        file_config.server.format = format;
    }

    let hub = Hub::spawn(file_config.hub.to_hub_config());

    let bind_addr = file_config.server.bind_addr();
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    info!("chatd listening on {}", listener.local_addr()?);

    let stop_accepting = CancellationToken::new();
    let server = tokio::spawn(transport::serve(
        listener,
        hub.clone(),
        file_config.server.format,
        stop_accepting.clone(),
    ));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to install Ctrl+C handler")?;
    info!("Received shutdown signal, cleaning up...");

    stop_accepting.cancel();
    hub.shutdown();
    if tokio::time::timeout(SHUTDOWN_GRACE, hub.stopped())
        .await
        .is_err()
    {
        warn!("Hub did not stop within {:?}", SHUTDOWN_GRACE);
    }
    if let Err(e) = server.await {
        warn!("Listener task failed: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}
