//! Consumption reports and their per-round aggregate

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One consumer's per-slot consumption for a round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumptionReport {
    /// Consumer identifier as sent on the wire
    pub consumer_id: i32,
    /// Consumption per slot, always `slots` entries
    pub values: Vec<i32>,
}

impl ConsumptionReport {
    pub fn new(consumer_id: i32, values: Vec<i32>) -> Self {
        Self {
            consumer_id,
            values,
        }
    }

    /// Check slot count and sign of every value
    pub fn validate(&self, slots: usize) -> Result<(), ValidationError> {
        if self.values.len() != slots {
            return Err(ValidationError::SlotCountMismatch {
                expected: slots,
                actual: self.values.len(),
            });
        }
        if let Some((slot, &value)) = self.values.iter().enumerate().find(|(_, v)| **v < 0) {
            return Err(ValidationError::NegativeConsumption {
                consumer_id: self.consumer_id,
                slot,
                value,
            });
        }
        Ok(())
    }
}

/// System-wide consumption per slot, summed over a full round of reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedConsumption {
    values: Vec<u64>,
}

impl AggregatedConsumption {
    /// Per-slot sum over `reports`; every report is validated first
    pub fn from_reports(
        reports: &[ConsumptionReport],
        slots: usize,
    ) -> Result<Self, ValidationError> {
        for report in reports {
            report.validate(slots)?;
        }

        let values = (0..slots)
            .map(|slot| reports.iter().map(|r| r.values[slot] as u64).sum())
            .collect();

        Ok(Self { values })
    }

    /// Wrap raw per-slot totals
    pub fn from_values(values: Vec<u64>) -> Self {
        Self { values }
    }

    #[inline]
    pub fn values(&self) -> &[u64] {
        &self.values
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for AggregatedConsumption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, ")")
    }
}
