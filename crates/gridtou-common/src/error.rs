//! Error types for GridTOU
//!
//! Provides a unified error type and domain-specific error variants

use thiserror::Error;

/// Result type alias using GridError
pub type Result<T> = std::result::Result<T, GridError>;

/// Unified error type for GridTOU operations
#[derive(Debug, Error)]
pub enum GridError {
    // Schedule / report / profit validation
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    // Negotiation protocol violations
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    // Session I/O failures
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Rejected schedules, reports and scores
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Slot count mismatch: expected {expected}, got {actual}")]
    SlotCountMismatch { expected: usize, actual: usize },

    #[error("Price {price} at slot {slot} outside [{min}, {max}]")]
    PriceOutOfBounds {
        slot: usize,
        price: f32,
        min: f32,
        max: f32,
    },

    #[error("Negative consumption {value} at slot {slot} from consumer {consumer_id}")]
    NegativeConsumption {
        consumer_id: i32,
        slot: usize,
        value: i32,
    },

    #[error("Session {session} already reported for round {round}")]
    DuplicateReport { session: u64, round: u64 },

    #[error("Profit is not finite: {0}")]
    NonFiniteProfit(f32),

    #[error("Invalid price bounds: [{min}, {max}]")]
    InvalidBounds { min: f32, max: f32 },
}

/// Negotiation protocol violations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("Population full: {population} sessions already joined")]
    PopulationFull { population: usize },

    #[error("Stale report for round {report_round}, round in flight is {current_round}")]
    StaleReport { report_round: u64, current_round: u64 },

    #[error("Round {round} is still in flight")]
    RoundInFlight { round: u64 },

    #[error("Round {round} has {received} of {expected} reports")]
    IncompleteRound {
        round: u64,
        received: usize,
        expected: usize,
    },

    #[error("Round {round} aborted: {reason}")]
    RoundAborted { round: u64, reason: String },

    #[error("Round {round} timed out after {timeout_ms}ms")]
    RoundTimeout { round: u64, timeout_ms: u64 },

    #[error("Frame of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("Protocol already terminated")]
    Terminated,

    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),
}

/// Session I/O failures
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Connection closed by peer")]
    Closed,

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

impl From<std::io::Error> for GridError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            GridError::Connection(ConnectionError::Closed)
        } else {
            GridError::Connection(ConnectionError::Io(err))
        }
    }
}

impl From<bincode::Error> for GridError {
    fn from(err: bincode::Error) -> Self {
        GridError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for GridError {
    fn from(err: serde_json::Error) -> Self {
        GridError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for GridError {
    fn from(err: config::ConfigError) -> Self {
        GridError::Config(err.to_string())
    }
}

impl From<anyhow::Error> for GridError {
    fn from(err: anyhow::Error) -> Self {
        GridError::Internal(err.to_string())
    }
}

impl GridError {
    /// Whether the error came from the session transport
    pub fn is_connection(&self) -> bool {
        matches!(self, GridError::Connection(_))
    }
}
