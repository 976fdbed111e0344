//! GridTOU consumer binary
//!
//! Connects every configured household to the retailer and prints the
//! terminal price each of them received.

use anyhow::Result;
use gridtou_common::VERSION;
use gridtou_consumer::{run_population, ConsumerConfig};
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

    info!("Starting GridTOU consumers v{}", VERSION);

    let config = ConsumerConfig::load()?;
    info!(
        retailer = %config.retailer_addr(),
        consumers = config.profiles.len(),
        "Loaded configuration"
    );

    let summaries = run_population(&config).await?;
    println!("{}", serde_json::to_string_pretty(&summaries)?);

    info!("All consumers finished");
    Ok(())
}
