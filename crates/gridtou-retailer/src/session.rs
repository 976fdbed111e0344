//! Per-connection consumer session
//!
//! ```text
//! Connected → AwaitingPrice → SentPrice → AwaitingReport → ReportSubmitted ─┐
//!                   ▲                                                        │
//!                   └────────────────────────────────────────────────────────┘
//!             (terminated broadcast) → Terminated
//! ```

use crate::coordinator::{RetailerCoordinator, RoundId, SessionId};
use gridtou_common::protocol::ReportMessage;
use gridtou_common::{
    FramedConnection, GridError, PriceSchedule, PriceSignal, ProtocolError, Result,
};
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, instrument, trace, warn};

/// Where a session is in the round loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    AwaitingPrice,
    SentPrice,
    AwaitingReport,
    ReportSubmitted,
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Connected => "connected",
            SessionState::AwaitingPrice => "awaiting_price",
            SessionState::SentPrice => "sent_price",
            SessionState::AwaitingReport => "awaiting_report",
            SessionState::ReportSubmitted => "report_submitted",
            SessionState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// What a session did before it ended
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub peer: String,
    pub final_state: SessionState,
    /// Reports accepted by the coordinator
    pub reports_submitted: u64,
    /// Reports refused as invalid or stale
    pub reports_rejected: u64,
    pub error: Option<String>,
}

enum Next {
    Report(Result<ReportMessage>),
    Terminated,
}

/// Relays prices to one remote consumer and feeds its reports back
pub struct ConsumerSessionHandler<S> {
    session_id: SessionId,
    peer: String,
    conn: FramedConnection<S>,
    coordinator: Arc<RetailerCoordinator>,
    state: SessionState,
    last_round: RoundId,
    reports_submitted: u64,
    reports_rejected: u64,
}

impl<S> ConsumerSessionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(
        session_id: SessionId,
        peer: impl Into<String>,
        stream: S,
        coordinator: Arc<RetailerCoordinator>,
    ) -> Self {
        Self {
            session_id,
            peer: peer.into(),
            conn: FramedConnection::new(stream),
            coordinator,
            state: SessionState::Connected,
            last_round: 0,
            reports_submitted: 0,
            reports_rejected: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the session to completion, logging instead of returning errors.
    ///
    /// A failed session is not removed from the quorum.
    pub async fn serve(self) -> SessionSummary {
        let session_id = self.session_id;
        let peer = self.peer.clone();
        match self.run().await {
            Ok(summary) => summary,
            Err((summary, err)) => {
                if err.is_connection() {
                    error!(session_id, %peer, error = %err, "Session connection failed");
                } else {
                    warn!(session_id, %peer, error = %err, "Session ended with error");
                }
                summary
            }
        }
    }

    /// Join the barrier and relay rounds until the protocol terminates
    #[instrument(skip(self), fields(session = self.session_id, peer = %self.peer))]
    pub async fn run(mut self) -> std::result::Result<SessionSummary, (SessionSummary, GridError)> {
        let result = self.relay().await;
        let mut summary = self.summary();

        match result {
            Ok(()) => {
                if let Err(err) = self.conn.close().await {
                    debug!(error = %err, "Close after terminal price failed");
                }
                info!(reports = summary.reports_submitted, "Session closed");
                Ok(summary)
            }
            Err(err) => {
                summary.error = Some(err.to_string());
                Err((summary, err))
            }
        }
    }

    async fn relay(&mut self) -> Result<()> {
        // Subscribe before joining so the first candidate cannot be missed
        let mut rx = self.coordinator.subscribe();
        let joined = self.coordinator.barrier().join()?;
        debug!(joined, "Joined population");
        self.transition(SessionState::AwaitingPrice);

        loop {
            let last_round = self.last_round;
            let broadcast = {
                let broadcast = rx
                    .wait_for(|b| b.terminated || b.round > last_round)
                    .await
                    .map_err(|_| GridError::Internal("price channel closed".into()))?;
                (*broadcast).clone()
            };

            if broadcast.terminated {
                return self.send_terminal(broadcast.schedule.as_ref()).await;
            }

            let schedule = broadcast.schedule.ok_or_else(|| {
                GridError::Internal(format!("round {} published without price", broadcast.round))
            })?;
            self.last_round = broadcast.round;
            self.conn.send(&PriceSignal::candidate(&schedule)).await?;
            self.transition(SessionState::SentPrice);
            debug!(round = broadcast.round, %schedule, "Price sent");

            self.transition(SessionState::AwaitingReport);
            let coordinator = Arc::clone(&self.coordinator);
            let next = tokio::select! {
                received = self.conn.recv::<ReportMessage>() => Next::Report(received),
                _ = coordinator.wait_terminated() => Next::Terminated,
            };

            let report = match next {
                Next::Report(received) => received?,
                Next::Terminated => {
                    // consumer is mid-round; the terminal price replaces its report
                    let final_price = rx.borrow().schedule.clone();
                    return self.send_terminal(final_price.as_ref()).await;
                }
            };

            debug!(round = broadcast.round, values = ?report.values, "Report received");
            self.submit(broadcast.round, report);
        }
    }

    fn submit(&mut self, round: RoundId, report: ReportMessage) {
        let consumer_id = report.consumer_id;
        match self
            .coordinator
            .submit_consumption_report(round, self.session_id, report)
        {
            Ok(_) => {
                self.reports_submitted += 1;
                self.transition(SessionState::ReportSubmitted);
            }
            Err(GridError::Validation(err)) => {
                self.reports_rejected += 1;
                warn!(round, consumer_id, error = %err, "Invalid report, round aborted");
            }
            Err(GridError::Protocol(ProtocolError::StaleReport {
                report_round,
                current_round,
            })) => {
                self.reports_rejected += 1;
                debug!(report_round, current_round, consumer_id, "Stale report dropped");
            }
            Err(err) => {
                self.reports_rejected += 1;
                debug!(round, consumer_id, error = %err, "Report not accepted");
            }
        }
        self.transition(SessionState::AwaitingPrice);
    }

    async fn send_terminal(&mut self, schedule: Option<&PriceSchedule>) -> Result<()> {
        match schedule {
            Some(schedule) => {
                self.conn.send(&PriceSignal::terminal(schedule)).await?;
                debug!(%schedule, "Terminal price sent");
            }
            None => warn!("Terminated without a price, closing"),
        }
        self.transition(SessionState::Terminated);
        Ok(())
    }

    fn transition(&mut self, next: SessionState) {
        trace!(from = %self.state, to = %next, "Session state");
        self.state = next;
    }

    fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id,
            peer: self.peer.clone(),
            final_state: self.state,
            reports_submitted: self.reports_submitted,
            reports_rejected: self.reports_rejected,
            error: None,
        }
    }
}
