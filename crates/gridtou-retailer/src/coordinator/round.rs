//! Per-round state shared by the driver and the consumer sessions

use gridtou_common::{AggregatedConsumption, ConsumptionReport, PriceSchedule, ValidationError};
use serde::Serialize;

/// Round sequence number; 0 means nothing has been published yet
pub type RoundId = u64;

/// Identifies the connection a report arrived on, assigned by the acceptor
pub type SessionId = u64;

/// What consumer sessions observe on the price channel
#[derive(Debug, Clone, PartialEq)]
pub struct Broadcast {
    /// Round the schedule belongs to
    pub round: RoundId,
    /// Candidate while running, final price once terminated
    pub schedule: Option<PriceSchedule>,
    pub terminated: bool,
}

impl Broadcast {
    pub(crate) fn idle() -> Self {
        Self {
            round: 0,
            schedule: None,
            terminated: false,
        }
    }
}

/// A fully reported and scored round
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundOutcome {
    pub round: RoundId,
    pub aggregated: AggregatedConsumption,
    pub profit: f32,
}

/// How a round ended
#[derive(Debug, Clone, PartialEq)]
pub enum RoundStatus {
    Completed(RoundOutcome),
    Aborted { round: RoundId, reason: String },
}

impl RoundStatus {
    pub fn round(&self) -> RoundId {
        match self {
            RoundStatus::Completed(outcome) => outcome.round,
            RoundStatus::Aborted { round, .. } => *round,
        }
    }
}

/// Mutable negotiation state, only ever touched under the coordinator lock
#[derive(Debug)]
pub(crate) struct RoundState {
    pub round: RoundId,
    /// A candidate is published and still collecting reports
    pub round_open: bool,
    pub current_price: Option<PriceSchedule>,
    pub current_profit: Option<f32>,
    pub candidate_price: Option<PriceSchedule>,
    pub candidate_profit: Option<f32>,
    /// Reports of the round, keyed by the session that delivered them
    pub pending_reports: Vec<(SessionId, ConsumptionReport)>,
    pub temperature: f32,
    pub round_index: u32,
    pub terminated: bool,
}

impl RoundState {
    pub fn new(temperature: f32, round_index: u32) -> Self {
        Self {
            round: 0,
            round_open: false,
            current_price: None,
            current_profit: None,
            candidate_price: None,
            candidate_profit: None,
            pending_reports: Vec::new(),
            temperature,
            round_index,
            terminated: false,
        }
    }

    /// Close the open round, dropping whatever was collected
    pub fn abort(&mut self) {
        self.round_open = false;
        self.pending_reports.clear();
        self.candidate_profit = None;
    }

    pub fn has_report_from(&self, session: SessionId) -> bool {
        self.pending_reports.iter().any(|(s, _)| *s == session)
    }

    /// Per-slot sum of the collected reports
    pub fn aggregate(&self, slots: usize) -> Result<AggregatedConsumption, ValidationError> {
        let reports: Vec<ConsumptionReport> =
            self.pending_reports.iter().map(|(_, r)| r.clone()).collect();
        AggregatedConsumption::from_reports(&reports, slots)
    }

    pub fn snapshot(&self) -> RoundSnapshot {
        RoundSnapshot {
            round: self.round,
            round_open: self.round_open,
            pending_reports: self.pending_reports.len(),
            current_profit: self.current_profit,
            candidate_profit: self.candidate_profit,
            temperature: self.temperature,
            round_index: self.round_index,
            terminated: self.terminated,
        }
    }
}

/// Point-in-time copy of the round state for logs and tests
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundSnapshot {
    pub round: RoundId,
    pub round_open: bool,
    pub pending_reports: usize,
    pub current_profit: Option<f32>,
    pub candidate_profit: Option<f32>,
    pub temperature: f32,
    pub round_index: u32,
    pub terminated: bool,
}
