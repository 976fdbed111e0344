//! # GridTOU Consumer
//!
//! Simulated demand-responsive households. Each configured profile opens its
//! own connection to the retailer and answers every published price with a
//! consumption report computed by the satisfaction response model.

pub mod client;
pub mod config;

pub use client::{connect_with_retry, ConsumerClient, ConsumerRunSummary};
pub use config::ConsumerConfig;

use gridtou_common::{GridError, Result, SatisfactionModel};
use tokio::task::JoinSet;
use tracing::{error, info};

/// Run every configured consumer concurrently until the retailer terminates.
///
/// Summaries are ordered by consumer id. Fails with the first error if any
/// consumer did not finish cleanly.
pub async fn run_population(config: &ConsumerConfig) -> Result<Vec<ConsumerRunSummary>> {
    config.validate()?;

    let addr = config.retailer_addr();
    let mut tasks = JoinSet::new();
    for profile in config.profiles.iter().cloned() {
        let client = ConsumerClient::with_model(
            profile,
            SatisfactionModel::new(config.demand_factor),
            config.slots,
            config.bounds,
        );
        let addr = addr.clone();
        let attempts = config.connect_attempts;
        let retry = config.connect_retry();
        tasks.spawn(async move {
            let consumer_id = client.consumer_id();
            (consumer_id, client.run(&addr, attempts, retry).await)
        });
    }
    info!(consumers = config.profiles.len(), %addr, "Consumers started");

    let mut summaries = Vec::with_capacity(config.profiles.len());
    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(summary))) => summaries.push(summary),
            Ok((consumer_id, Err(err))) => {
                error!(consumer_id, error = %err, "Consumer failed");
                first_error.get_or_insert(err);
            }
            Err(err) => {
                error!(error = %err, "Consumer task panicked");
                first_error.get_or_insert(GridError::Internal(err.to_string()));
            }
        }
    }

    if let Some(err) = first_error {
        return Err(err);
    }
    summaries.sort_by_key(|s| s.consumer_id);
    Ok(summaries)
}
