mod bot;
mod config;
mod platform;
mod rows;
mod server;
mod sheets;
mod snapshot;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::AppState;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sheetbot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Log tab: {}", config.sheets.log_tab);
    info!("  Status tab: {}", config.sheets.status_tab);
    info!("  Snapshot rows: {}", config.snapshot.max_rows);
    info!("  HTTP timeout: {:?}", config.http_timeout());

    let state = Arc::new(AppState::from_config(&config)?);

    info!("Webhook server is starting...");
    server::serve(state, &config.server).await?;

    Ok(())
}
