//! # GridTOU Common
//!
//! Shared types, errors and wire protocol for the GridTOU time-of-use price
//! negotiation.
//!
//! ## Core Types
//!
//! - [`PriceSchedule`]: per-slot prices bounded by [`PriceBounds`]
//! - [`ConsumptionReport`]: one consumer's per-slot reply to a schedule
//! - [`AggregatedConsumption`]: per-slot sum of a full round of reports
//! - [`CostModel`]: retailer profit formula
//!
//! ## Protocol
//!
//! - [`protocol::PriceSignal`]: retailer → consumer broadcast
//! - [`protocol::FramedConnection`]: length-prefixed bincode framing
//!
//! ## Consumers
//!
//! - [`response::SatisfactionModel`]: deterministic demand response

pub mod error;
pub mod protocol;
pub mod response;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{ConnectionError, GridError, ProtocolError, Result, ValidationError};
pub use protocol::{FramedConnection, PriceSignal};
pub use response::{AdjustableAppliance, ConsumerProfile, ResponseModel, SatisfactionModel};
pub use types::{
    consumption::{AggregatedConsumption, ConsumptionReport},
    price::{PriceBounds, PriceSchedule},
    profit::CostModel,
};

/// GridTOU version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Number of time slots per cycle
pub const DEFAULT_SLOTS: usize = 4;

/// Number of consumers the retailer waits for
pub const DEFAULT_POPULATION: usize = 2;

/// Retailer listen port
pub const DEFAULT_PORT: u16 = 1234;
