//! Session barrier: holds the search back until the whole population joined

use gridtou_common::{ProtocolError, Result};
use tokio::sync::watch;
use tracing::{debug, info};

/// Counts joined consumer sessions against a fixed population size
pub struct SessionBarrier {
    population: usize,
    joined: watch::Sender<usize>,
}

impl SessionBarrier {
    pub fn new(population: usize) -> Self {
        let (joined, _) = watch::channel(0);
        Self { population, joined }
    }

    /// Register one session. Returns the number of joined sessions including
    /// this one, or `PopulationFull` once all seats are taken.
    pub fn join(&self) -> Result<usize> {
        let mut joined_now = 0;
        let admitted = self.joined.send_if_modified(|joined| {
            if *joined >= self.population {
                return false;
            }
            *joined += 1;
            joined_now = *joined;
            true
        });

        if !admitted {
            return Err(ProtocolError::PopulationFull {
                population: self.population,
            }
            .into());
        }

        if joined_now == self.population {
            info!(population = self.population, "Quorum reached");
        } else {
            debug!(joined = joined_now, population = self.population, "Session joined");
        }
        Ok(joined_now)
    }

    /// Wait until every seat is taken.
    ///
    /// Never resolves if fewer than `population` sessions ever join.
    pub async fn await_quorum(&self) {
        let mut rx = self.joined.subscribe();
        let population = self.population;
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|joined| *joined >= population).await;
    }

    pub fn joined(&self) -> usize {
        *self.joined.borrow()
    }

    pub fn population(&self) -> usize {
        self.population
    }

    pub fn is_complete(&self) -> bool {
        self.joined() >= self.population
    }
}
