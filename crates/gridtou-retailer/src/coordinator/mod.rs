//! Retailer coordinator
//!
//! Owns the negotiation state shared by the annealing driver and every
//! consumer session. All state lives behind one mutex that is never held
//! across an `.await`; waiting happens on `watch` channels keyed by round
//! sequence number:
//!
//! - price channel: sessions wait for a round newer than the last they served,
//!   or for termination
//! - round channel: the driver waits for the status of the round it published
//! - barrier: the driver waits for the full population to join

mod barrier;
mod round;

pub use barrier::SessionBarrier;
pub use round::{Broadcast, RoundId, RoundOutcome, RoundSnapshot, RoundStatus, SessionId};

use crate::config::RetailerConfig;
use gridtou_common::{
    AggregatedConsumption, ConsumptionReport, CostModel, GridError, PriceBounds, PriceSchedule,
    ProtocolError, Result, ValidationError,
};
use parking_lot::Mutex;
use round::RoundState;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Reason attached to a round cut short by termination
const TERMINATED_REASON: &str = "protocol terminated";

/// Shared round state plus the signals around it
pub struct RetailerCoordinator {
    slots: usize,
    bounds: PriceBounds,
    cost: CostModel,
    barrier: SessionBarrier,
    state: Mutex<RoundState>,
    price_tx: watch::Sender<Broadcast>,
    round_tx: watch::Sender<Option<RoundStatus>>,
}

impl RetailerCoordinator {
    pub fn new(
        population: usize,
        slots: usize,
        bounds: PriceBounds,
        cost: CostModel,
        temperature: f32,
        round_index: u32,
    ) -> Self {
        let (price_tx, _) = watch::channel(Broadcast::idle());
        let (round_tx, _) = watch::channel(None);
        Self {
            slots,
            bounds,
            cost,
            barrier: SessionBarrier::new(population),
            state: Mutex::new(RoundState::new(temperature, round_index)),
            price_tx,
            round_tx,
        }
    }

    pub fn from_config(config: &RetailerConfig) -> Self {
        Self::new(
            config.population,
            config.slots,
            config.bounds,
            config.cost,
            config.annealing.initial_temperature,
            config.annealing.initial_round_index,
        )
    }

    pub fn barrier(&self) -> &SessionBarrier {
        &self.barrier
    }

    pub fn population(&self) -> usize {
        self.barrier.population()
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    pub fn bounds(&self) -> &PriceBounds {
        &self.bounds
    }

    /// Receiver for price broadcasts; the current value counts as unseen
    /// for `wait_for`
    pub fn subscribe(&self) -> watch::Receiver<Broadcast> {
        self.price_tx.subscribe()
    }

    /// Resolves once the protocol has terminated
    pub async fn wait_terminated(&self) {
        let mut rx = self.price_tx.subscribe();
        let _ = rx.wait_for(|b| b.terminated).await;
    }

    /// Open a new round with `price` as candidate and wake every session.
    ///
    /// Fails if the previous round is still collecting reports or the
    /// protocol has terminated.
    pub fn publish_candidate(&self, price: PriceSchedule) -> Result<RoundId> {
        price.validate(self.slots, &self.bounds)?;

        let mut state = self.state.lock();
        if state.terminated {
            return Err(ProtocolError::Terminated.into());
        }
        if state.round_open {
            return Err(ProtocolError::RoundInFlight { round: state.round }.into());
        }

        state.round += 1;
        state.round_open = true;
        state.pending_reports.clear();
        state.candidate_profit = None;
        state.candidate_price = Some(price.clone());
        let round = state.round;

        self.price_tx.send_replace(Broadcast {
            round,
            schedule: Some(price),
            terminated: false,
        });
        drop(state);

        debug!(round, "Candidate published");
        Ok(round)
    }

    /// Add the report `session` delivered to the round in flight.
    ///
    /// Returns the scored outcome when this report completes the round. A
    /// report that fails validation, or a second report from the same
    /// session, aborts the whole round. The wire `consumer_id` is not an
    /// identity: independent consumer processes may reuse ids.
    pub fn submit_consumption_report(
        &self,
        round: RoundId,
        session: SessionId,
        report: ConsumptionReport,
    ) -> Result<Option<RoundOutcome>> {
        let mut state = self.state.lock();
        if state.terminated {
            return Err(ProtocolError::Terminated.into());
        }
        if !state.round_open || round != state.round {
            return Err(ProtocolError::StaleReport {
                report_round: round,
                current_round: state.round,
            }
            .into());
        }

        if let Err(err) = report.validate(self.slots) {
            self.abort_locked(&mut state, err.to_string());
            return Err(err.into());
        }
        if state.has_report_from(session) {
            let err = ValidationError::DuplicateReport { session, round };
            self.abort_locked(&mut state, err.to_string());
            return Err(err.into());
        }

        state.pending_reports.push((session, report));
        if state.pending_reports.len() < self.population() {
            return Ok(None);
        }

        let scored = Self::aggregate_locked(&state, self.slots).and_then(|agg| {
            let price = state
                .candidate_price
                .as_ref()
                .ok_or_else(|| GridError::Internal("open round without candidate".into()))?;
            let profit = self.compute_profit(price, &agg)?;
            Ok((agg, profit))
        });

        match scored {
            Ok((aggregated, profit)) => {
                state.round_open = false;
                state.candidate_profit = Some(profit);
                let outcome = RoundOutcome {
                    round,
                    aggregated,
                    profit,
                };
                self.round_tx
                    .send_replace(Some(RoundStatus::Completed(outcome.clone())));
                drop(state);

                debug!(round, profit, aggregated = %outcome.aggregated, "Round complete");
                Ok(Some(outcome))
            }
            Err(err) => {
                self.abort_locked(&mut state, err.to_string());
                Err(err)
            }
        }
    }

    /// Per-slot sum over the latest round, available only once all N
    /// reports are in. An open, aborted or unpublished round is refused.
    pub fn aggregate(&self) -> Result<AggregatedConsumption> {
        let state = self.state.lock();
        if state.round_open {
            return Err(ProtocolError::RoundInFlight { round: state.round }.into());
        }
        let received = state.pending_reports.len();
        if received < self.population() {
            return Err(ProtocolError::IncompleteRound {
                round: state.round,
                received,
                expected: self.population(),
            }
            .into());
        }
        Self::aggregate_locked(&state, self.slots)
    }

    fn aggregate_locked(state: &RoundState, slots: usize) -> Result<AggregatedConsumption> {
        Ok(state.aggregate(slots)?)
    }

    /// Score `price` against an aggregate with the configured cost model
    pub fn compute_profit(
        &self,
        price: &PriceSchedule,
        aggregated: &AggregatedConsumption,
    ) -> Result<f32> {
        Ok(self.cost.compute_profit(price, aggregated)?)
    }

    /// Wait for `round` to complete or abort
    pub async fn await_round(&self, round: RoundId) -> Result<RoundOutcome> {
        let mut rx = self.round_tx.subscribe();
        let status = {
            let status = rx
                .wait_for(|status| status.as_ref().map_or(false, |s| s.round() >= round))
                .await
                .map_err(|_| GridError::Internal("round channel closed".into()))?;
            (*status).clone()
        };

        match status {
            Some(RoundStatus::Completed(outcome)) if outcome.round == round => Ok(outcome),
            Some(RoundStatus::Aborted { round: r, reason }) if r == round => {
                Err(ProtocolError::RoundAborted { round, reason }.into())
            }
            Some(other) => Err(ProtocolError::StaleReport {
                report_round: round,
                current_round: other.round(),
            }
            .into()),
            None => Err(GridError::Internal("round status missing".into())),
        }
    }

    /// Promote the scored candidate to current
    pub fn accept_candidate(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.round_open {
            return Err(ProtocolError::RoundInFlight { round: state.round }.into());
        }
        let (price, profit) = match (&state.candidate_price, state.candidate_profit) {
            (Some(price), Some(profit)) => (price.clone(), profit),
            _ => {
                return Err(GridError::Internal(format!(
                    "round {} has no scored candidate",
                    state.round
                )))
            }
        };
        state.current_price = Some(price);
        state.current_profit = Some(profit);
        Ok(())
    }

    /// Accepted schedule and its profit
    pub fn current(&self) -> Option<(PriceSchedule, f32)> {
        let state = self.state.lock();
        match (&state.current_price, state.current_profit) {
            (Some(price), Some(profit)) => Some((price.clone(), profit)),
            _ => None,
        }
    }

    /// Record the temperature after a cooling step
    pub fn record_cooling(&self, temperature: f32, round_index: u32) {
        let mut state = self.state.lock();
        state.temperature = temperature;
        state.round_index = round_index;
    }

    /// Terminate the protocol and broadcast the final schedule.
    ///
    /// An open round is aborted. The broadcast carries the accepted schedule,
    /// falling back to the last candidate; `None` if nothing was ever
    /// published.
    pub fn finalize(&self) -> Result<Option<PriceSchedule>> {
        let mut state = self.state.lock();
        if state.terminated {
            return Err(ProtocolError::Terminated.into());
        }
        if state.round_open {
            self.abort_locked(&mut state, TERMINATED_REASON.to_string());
        }
        state.terminated = true;

        let final_price = state
            .current_price
            .clone()
            .or_else(|| state.candidate_price.clone());
        let round = state.round;
        self.price_tx.send_replace(Broadcast {
            round,
            schedule: final_price.clone(),
            terminated: true,
        });
        drop(state);

        match &final_price {
            Some(price) => info!(round, %price, "Protocol terminated"),
            None => warn!(round, "Protocol terminated before any price was published"),
        }
        Ok(final_price)
    }

    pub fn is_terminated(&self) -> bool {
        self.state.lock().terminated
    }

    pub fn snapshot(&self) -> RoundSnapshot {
        self.state.lock().snapshot()
    }

    fn abort_locked(&self, state: &mut RoundState, reason: String) {
        let round = state.round;
        state.abort();
        warn!(round, %reason, "Round aborted");
        self.round_tx
            .send_replace(Some(RoundStatus::Aborted { round, reason }));
    }
}
