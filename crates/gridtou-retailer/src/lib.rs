//! # GridTOU Retailer
//!
//! Searches for a profit-maximizing time-of-use price schedule with simulated
//! annealing, scoring each candidate by publishing it to a fixed population of
//! demand-responsive consumers and aggregating their replies.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     RetailerServer                       │
//! │  ┌────────────┐   one task per connection                │
//! │  │  Acceptor  │──▶ ConsumerSessionHandler ×N             │
//! │  └────────────┘          │ join / report   ▲ price       │
//! │                          ▼                 │             │
//! │  ┌────────────────────────────────────────────────┐      │
//! │  │              RetailerCoordinator               │      │
//! │  │  SessionBarrier · RoundState · watch channels  │      │
//! │  └────────────────────────────────────────────────┘      │
//! │                          ▲ publish / await round         │
//! │  ┌───────────────────────┴────────────────────────┐      │
//! │  │                AnnealingDriver                 │      │
//! │  │  perturb · Metropolis test · cooling schedule  │      │
//! │  └────────────────────────────────────────────────┘      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Exactly one round is in flight at any time. Rounds carry a sequence
//! number, so stale reports and stale wakeups are detected and dropped.

pub mod annealing;
pub mod config;
pub mod coordinator;
pub mod server;
pub mod session;

pub use annealing::{metropolis_accept, AnnealingDriver, CoolingSchedule, DriverStats, SearchOutcome};
pub use config::{AnnealingSettings, RetailerConfig};
pub use coordinator::{
    Broadcast, RetailerCoordinator, RoundId, RoundOutcome, RoundSnapshot, RoundStatus,
    SessionBarrier, SessionId,
};
pub use server::RetailerServer;
pub use session::{ConsumerSessionHandler, SessionState, SessionSummary};
