//! Retailer profit for one round
//!
//! ```text
//! Profit = Σ aggregated[i] · price[i]  -  w · Σ (a · aggregated[i]² + b · aggregated[i]³)
//! ```
//!
//! Revenue and cost are accumulated slot by slot in `f32`; the subtraction is
//! the last operation.

use super::consumption::AggregatedConsumption;
use super::price::PriceSchedule;
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};

/// Default quadratic cost coefficient
pub const DEFAULT_COST_A: f32 = 0.005;

/// Default cubic cost coefficient
pub const DEFAULT_COST_B: f32 = 0.001;

/// Default cost weight
pub const DEFAULT_COST_WEIGHT: f32 = 1.0;

/// Generation cost coefficients
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostModel {
    /// Quadratic coefficient
    pub a: f32,
    /// Cubic coefficient
    pub b: f32,
    /// Overall cost weight
    pub weight: f32,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            a: DEFAULT_COST_A,
            b: DEFAULT_COST_B,
            weight: DEFAULT_COST_WEIGHT,
        }
    }
}

impl CostModel {
    pub fn new(a: f32, b: f32, weight: f32) -> Self {
        Self { a, b, weight }
    }

    /// Σ aggregated[i] · price[i]
    pub fn revenue(&self, price: &PriceSchedule, aggregated: &AggregatedConsumption) -> f32 {
        let mut revenue = 0f32;
        for (&load, &p) in aggregated.values().iter().zip(price.prices()) {
            revenue += load as f32 * p;
        }
        revenue
    }

    /// w · Σ (a · x² + b · x³)
    pub fn cost(&self, aggregated: &AggregatedConsumption) -> f32 {
        let mut total = 0f32;
        for &load in aggregated.values() {
            let x = load as f32;
            total += self.a * x.powi(2) + self.b * x.powi(3);
        }
        self.weight * total
    }

    /// Score a round; schedules and aggregates of different lengths, and
    /// non-finite results, are rejected
    pub fn compute_profit(
        &self,
        price: &PriceSchedule,
        aggregated: &AggregatedConsumption,
    ) -> Result<f32, ValidationError> {
        if price.len() != aggregated.len() {
            return Err(ValidationError::SlotCountMismatch {
                expected: price.len(),
                actual: aggregated.len(),
            });
        }

        let revenue = self.revenue(price, aggregated);
        let cost = self.cost(aggregated);
        let profit = revenue - cost;

        if !profit.is_finite() {
            return Err(ValidationError::NonFiniteProfit(profit));
        }
        Ok(profit)
    }
}
