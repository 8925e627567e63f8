//! Autohub Server
//!
//! Starts the hub on a storage directory and runs until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use autohub::{Args, Hub, HubConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = HubConfig::load(&args).context("failed to load settings")?;

    // RUST_LOG wins over the configured filter
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        storage = %config.storage.display(),
        "Starting autohub"
    );

    let hub = Hub::start(&config, Vec::new())
        .await
        .context("failed to start hub")?;
    info!(
        plugins = hub.plugins().enabled_count(),
        http_port = hub.server().settings().http_port,
        "Hub running, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    info!("Shutting down");
    hub.shutdown().await;
    Ok(())
}
