//! TCP acceptor and search orchestration

use crate::annealing::{AnnealingDriver, SearchOutcome};
use crate::config::RetailerConfig;
use crate::coordinator::RetailerCoordinator;
use crate::session::{ConsumerSessionHandler, SessionSummary};
use gridtou_common::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// How long sessions get to deliver the terminal price after the search ends
pub const SESSION_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Back-off after a failed `accept`
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Retailer process: acceptor, sessions and annealing driver
pub struct RetailerServer {
    config: RetailerConfig,
    coordinator: Arc<RetailerCoordinator>,
}

impl RetailerServer {
    pub fn new(config: RetailerConfig) -> Result<Self> {
        config.validate()?;
        let coordinator = Arc::new(RetailerCoordinator::from_config(&config));
        Ok(Self {
            config,
            coordinator,
        })
    }

    pub fn config(&self) -> &RetailerConfig {
        &self.config
    }

    pub fn coordinator(&self) -> Arc<RetailerCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Bind the configured address and run one negotiation
    pub async fn run(self) -> Result<SearchOutcome> {
        let listener = TcpListener::bind(self.config.listen_addr()).await?;
        self.serve(listener).await
    }

    /// Run one negotiation on an already bound listener.
    ///
    /// Resolves after the driver finished and every session delivered its
    /// terminal price or the drain timeout passed.
    pub async fn serve(self, listener: TcpListener) -> Result<SearchOutcome> {
        let rng = match self.config.annealing.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let driver = AnnealingDriver::new(self.coordinator(), &self.config.annealing, rng)?;

        info!(
            addr = %listener.local_addr()?,
            population = self.config.population,
            slots = self.config.slots,
            "Retailer listening"
        );
        let acceptor = tokio::spawn(accept_loop(listener, self.coordinator()));

        let outcome = driver.run().await;

        if !self.coordinator.is_terminated() {
            acceptor.abort();
        }
        let sessions = match acceptor.await {
            Ok(sessions) => sessions,
            Err(err) => {
                debug!(error = %err, "Acceptor stopped");
                JoinSet::new()
            }
        };
        let summaries = drain_sessions(sessions).await;
        info!(sessions = summaries.len(), "Sessions drained");

        outcome
    }
}

/// Accept consumers until the protocol terminates, one task per connection
async fn accept_loop(
    listener: TcpListener,
    coordinator: Arc<RetailerCoordinator>,
) -> JoinSet<SessionSummary> {
    let mut sessions = JoinSet::new();
    let mut next_session = 0u64;

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    next_session += 1;
                    if let Err(err) = stream.set_nodelay(true) {
                        debug!(error = %err, "Failed to set TCP_NODELAY");
                    }
                    info!(session = next_session, %peer, "Consumer connected");
                    let handler = ConsumerSessionHandler::new(
                        next_session,
                        peer.to_string(),
                        stream,
                        Arc::clone(&coordinator),
                    );
                    sessions.spawn(handler.serve());
                }
                Err(err) => {
                    warn!(error = %err, "Accept failed");
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            },
            _ = coordinator.wait_terminated() => break,
        }
    }

    debug!(accepted = next_session, "Acceptor stopped");
    sessions
}

async fn drain_sessions(mut sessions: JoinSet<SessionSummary>) -> Vec<SessionSummary> {
    let mut summaries = Vec::with_capacity(sessions.len());
    let drained = tokio::time::timeout(SESSION_DRAIN_TIMEOUT, async {
        while let Some(joined) = sessions.join_next().await {
            match joined {
                Ok(summary) => summaries.push(summary),
                Err(err) => warn!(error = %err, "Session task failed"),
            }
        }
    })
    .await;

    if drained.is_err() {
        warn!(remaining = sessions.len(), "Sessions still open after drain timeout");
        sessions.shutdown().await;
    }
    summaries
}
