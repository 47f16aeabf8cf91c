//! # Relay Server
//!
//! Real-time JSON room relay over WebSocket.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings (127.0.0.1:3002, endpoint /ws)
//! relay
//!
//! # Run with a specific config file
//! RELAY_CONFIG=/path/to/relay.toml relay
//!
//! # Run with environment variables
//! RELAY_PORT=8080 RELAY_HOST=0.0.0.0 relay
//! ```

mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::load()?;

    tracing::info!("Starting relay server on {}:{}", config.host, config.port);

    metrics::init_metrics();

    handlers::run_server(config).await?;

    Ok(())
}
