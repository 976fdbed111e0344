//! Consumer response model
//!
//! Turns a published price schedule into the consumption report of one
//! consumer. Each consumer has a fixed load per slot plus a set of adjustable
//! appliances whose draw shrinks as the slot price rises:
//!
//! ```text
//! draw(app, t)   = min(1.5 · (t + 1) / (satisfaction[app][t] + price[t]), app.max_draw)
//! consumption(t) = min(⌊Σ_app draw(app, t)⌋ + fixed_load[t], max_draw)
//! ```

use crate::error::ValidationError;
use crate::types::consumption::ConsumptionReport;
use crate::types::price::PriceSchedule;
use serde::{Deserialize, Serialize};

/// Scale of the per-slot demand numerator
pub const DEFAULT_DEMAND_FACTOR: f32 = 1.5;

/// An appliance whose draw responds to price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustableAppliance {
    /// Upper bound on this appliance's draw in any slot
    pub max_draw: f32,
    /// Satisfaction weight per slot
    pub satisfaction: Vec<f32>,
}

/// Static description of one consumer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumerProfile {
    pub consumer_id: i32,
    /// Non-shiftable load per slot
    pub fixed_load: Vec<i32>,
    pub appliances: Vec<AdjustableAppliance>,
    /// Cap on total consumption in any slot
    pub max_draw: i32,
}

impl ConsumerProfile {
    /// Check that every per-slot vector matches `slots`
    pub fn validate(&self, slots: usize) -> Result<(), ValidationError> {
        if self.fixed_load.len() != slots {
            return Err(ValidationError::SlotCountMismatch {
                expected: slots,
                actual: self.fixed_load.len(),
            });
        }
        if let Some((slot, &value)) = self.fixed_load.iter().enumerate().find(|(_, v)| **v < 0) {
            return Err(ValidationError::NegativeConsumption {
                consumer_id: self.consumer_id,
                slot,
                value,
            });
        }
        for appliance in &self.appliances {
            if appliance.satisfaction.len() != slots {
                return Err(ValidationError::SlotCountMismatch {
                    expected: slots,
                    actual: appliance.satisfaction.len(),
                });
            }
        }
        Ok(())
    }

    /// The two reference households
    pub fn reference_profiles() -> Vec<ConsumerProfile> {
        fn appliance(max_draw: f32, satisfaction: [f32; 4]) -> AdjustableAppliance {
            AdjustableAppliance {
                max_draw,
                satisfaction: satisfaction.to_vec(),
            }
        }

        vec![
            ConsumerProfile {
                consumer_id: 0,
                fixed_load: vec![1, 2, 3, 1],
                appliances: vec![
                    appliance(2.0, [2.0, 4.0, 5.0, 3.0]),
                    appliance(3.0, [1.0, 3.0, 6.0, 3.0]),
                    appliance(4.0, [2.0, 5.0, 3.0, 4.0]),
                    appliance(4.0, [4.0, 1.0, 4.0, 3.0]),
                ],
                max_draw: 10,
            },
            ConsumerProfile {
                consumer_id: 1,
                fixed_load: vec![1, 3, 3, 1],
                appliances: vec![
                    appliance(2.0, [2.0, 2.0, 5.0, 3.0]),
                    appliance(3.0, [1.0, 6.0, 1.0, 3.0]),
                    appliance(1.0, [2.0, 3.0, 5.0, 3.0]),
                    appliance(3.0, [2.0, 1.0, 2.0, 4.0]),
                ],
                max_draw: 12,
            },
        ]
    }
}

/// Deterministic mapping from prices to one consumer's report
pub trait ResponseModel: Send + Sync {
    fn respond(&self, profile: &ConsumerProfile, price: &PriceSchedule) -> ConsumptionReport;
}

/// Satisfaction-weighted demand response
#[derive(Debug, Clone, Copy)]
pub struct SatisfactionModel {
    demand_factor: f32,
}

impl Default for SatisfactionModel {
    fn default() -> Self {
        Self {
            demand_factor: DEFAULT_DEMAND_FACTOR,
        }
    }
}

impl SatisfactionModel {
    pub fn new(demand_factor: f32) -> Self {
        Self { demand_factor }
    }

    /// Draw of one appliance in `slot`; slots the profile does not cover draw nothing
    fn appliance_draw(&self, appliance: &AdjustableAppliance, slot: usize, price: f32) -> f32 {
        match appliance.satisfaction.get(slot) {
            Some(&satisfaction) => {
                let demand = self.demand_factor * (slot as f32 + 1.0) / (satisfaction + price);
                demand.min(appliance.max_draw)
            }
            None => 0.0,
        }
    }
}

impl ResponseModel for SatisfactionModel {
    fn respond(&self, profile: &ConsumerProfile, price: &PriceSchedule) -> ConsumptionReport {
        let values = price
            .prices()
            .iter()
            .enumerate()
            .map(|(slot, &p)| {
                let adjustable: f32 = profile
                    .appliances
                    .iter()
                    .map(|app| self.appliance_draw(app, slot, p))
                    .sum();
                let fixed = profile.fixed_load.get(slot).copied().unwrap_or(0);
                (adjustable as i32 + fixed).clamp(0, profile.max_draw.max(0))
            })
            .collect();

        ConsumptionReport::new(profile.consumer_id, values)
    }
}
