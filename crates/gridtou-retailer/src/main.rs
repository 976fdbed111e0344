//! GridTOU retailer binary
//!
//! Listens for the configured consumer population, runs one price search and
//! prints the outcome as JSON.

use anyhow::Result;
use gridtou_common::VERSION;
use gridtou_retailer::{RetailerConfig, RetailerServer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .init();

    info!("Starting GridTOU retailer v{}", VERSION);

    let config = RetailerConfig::load()?;
    info!("Loaded configuration: {:?}", config);

    let server = RetailerServer::new(config)?;

    tokio::select! {
        outcome = server.run() => {
            let outcome = outcome?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down GridTOU retailer");
    Ok(())
}
