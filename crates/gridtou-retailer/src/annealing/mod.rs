//! Simulated annealing price search
//!
//! The driver is the only writer of candidates. Per round it perturbs one slot
//! of the accepted schedule, publishes it through the coordinator, waits for
//! every consumer's report to be scored, then applies the Metropolis test.
//! After a full sweep over all slots the temperature is cooled; the search
//! finalizes once it drops to the end temperature.

mod schedule;

pub use schedule::CoolingSchedule;

use crate::config::AnnealingSettings;
use crate::coordinator::{RetailerCoordinator, RoundOutcome};
use gridtou_common::{GridError, PriceSchedule, ProtocolError, Result};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Metropolis acceptance test.
///
/// A strictly better candidate is accepted without touching `rng`.
pub fn metropolis_accept<R: Rng + ?Sized>(
    candidate_profit: f32,
    current_profit: f32,
    temperature: f32,
    rng: &mut R,
) -> bool {
    if candidate_profit > current_profit {
        return true;
    }
    let r: f32 = rng.gen();
    r < ((candidate_profit - current_profit) / temperature).exp()
}

/// Counters collected over one search
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DriverStats {
    /// Rounds published, including the initial evaluation
    pub rounds: u64,
    pub sweeps: u64,
    pub accepted: u64,
    /// Includes aborted rounds
    pub rejected: u64,
    pub aborted: u64,
}

/// Result of a finished search
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub schedule: PriceSchedule,
    pub profit: f32,
    pub final_temperature: f32,
    pub stats: DriverStats,
}

/// Single control loop of the price search
pub struct AnnealingDriver<R> {
    coordinator: Arc<RetailerCoordinator>,
    cooling: CoolingSchedule,
    round_timeout: Option<Duration>,
    rng: R,
    stats: DriverStats,
}

impl<R: Rng + Send> AnnealingDriver<R> {
    pub fn new(
        coordinator: Arc<RetailerCoordinator>,
        settings: &AnnealingSettings,
        rng: R,
    ) -> Result<Self> {
        Ok(Self {
            coordinator,
            cooling: CoolingSchedule::from_settings(settings)?,
            round_timeout: settings.round_timeout(),
            rng,
            stats: DriverStats::default(),
        })
    }

    pub fn stats(&self) -> &DriverStats {
        &self.stats
    }

    /// Wait for the population, search, then terminate the protocol.
    ///
    /// The protocol is finalized even when the search fails, so every
    /// session gets a terminal price and can close.
    #[instrument(skip(self), fields(population = self.coordinator.population()))]
    pub async fn run(mut self) -> Result<SearchOutcome> {
        info!("Waiting for consumers");
        self.coordinator.barrier().await_quorum().await;
        info!("All consumers joined, starting search");

        let searched = self.search().await;
        let finalized = self.coordinator.finalize();
        searched?;
        finalized?;

        let (schedule, profit) = self
            .coordinator
            .current()
            .ok_or_else(|| GridError::Internal("search ended without an accepted price".into()))?;

        info!(
            %schedule,
            profit,
            rounds = self.stats.rounds,
            sweeps = self.stats.sweeps,
            accepted = self.stats.accepted,
            rejected = self.stats.rejected,
            aborted = self.stats.aborted,
            "Search finished"
        );

        Ok(SearchOutcome {
            schedule,
            profit,
            final_temperature: self.cooling.temperature(),
            stats: self.stats,
        })
    }

    async fn search(&mut self) -> Result<()> {
        let slots = self.coordinator.slots();
        let bounds = *self.coordinator.bounds();

        // An aborted initial round leaves nothing to compare against
        let initial = PriceSchedule::uniform(slots, &bounds, &mut self.rng);
        let outcome = self.evaluate(initial).await?;
        self.coordinator.accept_candidate()?;
        info!(profit = outcome.profit, "Initial price scored");

        while self.cooling.is_active() {
            for slot in 0..slots {
                self.step(slot).await?;
            }
            self.stats.sweeps += 1;

            let temperature = self.cooling.cool();
            self.coordinator
                .record_cooling(temperature, self.cooling.round_index());
            info!(
                sweep = self.stats.sweeps,
                temperature,
                profit = self.coordinator.current().map(|(_, p)| p),
                "Sweep complete"
            );
        }
        Ok(())
    }

    /// One perturb, publish, score, accept-or-reject cycle
    async fn step(&mut self, slot: usize) -> Result<()> {
        let (current, current_profit) = self
            .coordinator
            .current()
            .ok_or_else(|| GridError::Internal("no accepted price to perturb".into()))?;
        let candidate = self.perturb(&current, slot)?;

        match self.evaluate(candidate).await {
            Ok(outcome) => {
                let accepted = metropolis_accept(
                    outcome.profit,
                    current_profit,
                    self.cooling.temperature(),
                    &mut self.rng,
                );
                if accepted {
                    self.coordinator.accept_candidate()?;
                    self.stats.accepted += 1;
                } else {
                    self.stats.rejected += 1;
                }
                debug!(
                    round = outcome.round,
                    slot,
                    candidate = outcome.profit,
                    current = current_profit,
                    accepted,
                    "Candidate decided"
                );
                Ok(())
            }
            Err(GridError::Protocol(ProtocolError::RoundAborted { round, reason })) => {
                warn!(round, slot, %reason, "Round aborted, candidate rejected");
                self.stats.aborted += 1;
                self.stats.rejected += 1;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Copy of `current` with `slot` redrawn uniformly from the bounds
    fn perturb(&mut self, current: &PriceSchedule, slot: usize) -> Result<PriceSchedule> {
        let bounds = *self.coordinator.bounds();
        let price = bounds.sample(&mut self.rng);
        Ok(current.with_slot(slot, price, &bounds)?)
    }

    /// Publish `candidate` and wait for its round to be scored
    async fn evaluate(&mut self, candidate: PriceSchedule) -> Result<RoundOutcome> {
        let coordinator = Arc::clone(&self.coordinator);
        let round = coordinator.publish_candidate(candidate)?;
        self.stats.rounds += 1;

        let wait = coordinator.await_round(round);
        match self.round_timeout {
            Some(limit) => tokio::time::timeout(limit, wait).await.map_err(|_| {
                warn!(round, timeout_ms = limit.as_millis() as u64, "Round timed out");
                GridError::from(ProtocolError::RoundTimeout {
                    round,
                    timeout_ms: limit.as_millis() as u64,
                })
            })?,
            None => wait.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{RoundId, SessionId};
    use gridtou_common::{
        ConsumerProfile, CostModel, PriceBounds, ResponseModel, SatisfactionModel,
    };
    use rand::rngs::StdRng;
    use rand::{RngCore, SeedableRng};

    struct PanicRng;

    impl RngCore for PanicRng {
        fn next_u32(&mut self) -> u32 {
            panic!("rng consulted")
        }
        fn next_u64(&mut self) -> u64 {
            panic!("rng consulted")
        }
        fn fill_bytes(&mut self, _dest: &mut [u8]) {
            panic!("rng consulted")
        }
        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
            panic!("rng consulted")
        }
    }

    fn coordinator(population: usize) -> Arc<RetailerCoordinator> {
        let settings = AnnealingSettings::default();
        Arc::new(RetailerCoordinator::new(
            population,
            4,
            PriceBounds::default(),
            CostModel::default(),
            settings.initial_temperature,
            settings.initial_round_index,
        ))
    }

    /// Answers every round in-process; the report for `corrupt_round` is
    /// one slot short
    async fn fake_consumer(
        coordinator: Arc<RetailerCoordinator>,
        profile: ConsumerProfile,
        corrupt_round: Option<RoundId>,
    ) -> u64 {
        let mut rx = coordinator.subscribe();
        let session = coordinator.barrier().join().unwrap() as SessionId;
        let model = SatisfactionModel::default();
        let mut last = 0;
        let mut served = 0;
        loop {
            let broadcast = rx
                .wait_for(|b| b.terminated || b.round > last)
                .await
                .unwrap()
                .clone();
            if broadcast.terminated {
                return served;
            }
            last = broadcast.round;
            let mut report = model.respond(&profile, broadcast.schedule.as_ref().unwrap());
            if corrupt_round == Some(broadcast.round) {
                report.values.pop();
            }
            let _ = coordinator.submit_consumption_report(broadcast.round, session, report);
            served += 1;
        }
    }

    #[test]
    fn test_better_candidate_skips_rng() {
        let mut rng = PanicRng;
        assert!(metropolis_accept(10.0, 9.0, 0.3, &mut rng));
        assert!(metropolis_accept(-1.0, -1.5, 1e-9, &mut rng));
    }

    #[test]
    fn test_much_worse_candidate_rejected_when_cold() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..1000 {
            assert!(!metropolis_accept(1.0, 10.0, 0.01, &mut rng));
        }
    }

    #[test]
    fn test_equal_candidate_always_accepted() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..1000 {
            assert!(metropolis_accept(5.0, 5.0, 0.2, &mut rng));
        }
    }

    #[tokio::test]
    async fn test_full_search_with_in_process_consumers() {
        let coord = coordinator(2);
        let consumers: Vec<_> = ConsumerProfile::reference_profiles()
            .into_iter()
            .map(|p| tokio::spawn(fake_consumer(coord.clone(), p, None)))
            .collect();

        let driver = AnnealingDriver::new(
            coord.clone(),
            &AnnealingSettings::default(),
            StdRng::seed_from_u64(42),
        )
        .unwrap();
        let outcome = driver.run().await.unwrap();

        assert_eq!(outcome.stats.sweeps, 8);
        assert_eq!(outcome.stats.rounds, 33);
        assert_eq!(outcome.stats.accepted + outcome.stats.rejected, 32);
        assert_eq!(outcome.stats.aborted, 0);
        assert!(outcome
            .schedule
            .validate(4, &PriceBounds::default())
            .is_ok());
        assert!(outcome.final_temperature <= AnnealingSettings::default().end_temperature);
        assert!(coord.is_terminated());

        for consumer in consumers {
            assert_eq!(consumer.await.unwrap(), 33);
        }
    }

    #[tokio::test]
    async fn test_search_is_reproducible_with_seed() {
        let mut profits = Vec::new();
        for _ in 0..2 {
            let coord = coordinator(2);
            for profile in ConsumerProfile::reference_profiles() {
                tokio::spawn(fake_consumer(coord.clone(), profile, None));
            }
            let driver = AnnealingDriver::new(
                coord,
                &AnnealingSettings::default(),
                StdRng::seed_from_u64(9),
            )
            .unwrap();
            let outcome = driver.run().await.unwrap();
            profits.push((outcome.schedule, outcome.profit));
        }
        assert_eq!(profits[0], profits[1]);
    }

    #[tokio::test]
    async fn test_aborted_round_counts_as_rejected() {
        let coord = coordinator(2);
        let mut profiles = ConsumerProfile::reference_profiles().into_iter();
        tokio::spawn(fake_consumer(coord.clone(), profiles.next().unwrap(), None));
        tokio::spawn(fake_consumer(coord.clone(), profiles.next().unwrap(), Some(2)));

        let driver = AnnealingDriver::new(
            coord,
            &AnnealingSettings::default(),
            StdRng::seed_from_u64(1),
        )
        .unwrap();
        let outcome = driver.run().await.unwrap();

        assert_eq!(outcome.stats.aborted, 1);
        assert_eq!(outcome.stats.rounds, 33);
        assert_eq!(outcome.stats.accepted + outcome.stats.rejected, 32);
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_timeout_finalizes() {
        let coord = coordinator(2);
        let profile = ConsumerProfile::reference_profiles().remove(0);
        tokio::spawn(fake_consumer(coord.clone(), profile, None));
        // joins but never reports
        coord.barrier().join().unwrap();

        let settings = AnnealingSettings {
            round_timeout_ms: Some(50),
            ..AnnealingSettings::default()
        };
        let driver =
            AnnealingDriver::new(coord.clone(), &settings, StdRng::seed_from_u64(2)).unwrap();
        let err = driver.run().await.unwrap_err();

        assert!(matches!(
            err,
            GridError::Protocol(ProtocolError::RoundTimeout {
                round: 1,
                timeout_ms: 50
            })
        ));
        assert!(coord.is_terminated());
    }
}
