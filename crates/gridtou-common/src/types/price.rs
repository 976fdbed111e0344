//! PriceSchedule - per-slot time-of-use tariff
//!
//! A schedule is published by the retailer once per round. The annealing
//! search only ever changes one slot at a time, so the main constructor for
//! candidates is [`PriceSchedule::with_slot`], which copies every other slot
//! unchanged.

use crate::error::ValidationError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default lower price bound
pub const DEFAULT_MIN_PRICE: f32 = 0.5;

/// Default upper price bound
pub const DEFAULT_MAX_PRICE: f32 = 1.5;

/// Closed price interval `[min, max]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBounds {
    pub min: f32,
    pub max: f32,
}

impl Default for PriceBounds {
    fn default() -> Self {
        Self {
            min: DEFAULT_MIN_PRICE,
            max: DEFAULT_MAX_PRICE,
        }
    }
}

impl PriceBounds {
    /// Create bounds, rejecting inverted, negative or non-finite intervals
    pub fn new(min: f32, max: f32) -> Result<Self, ValidationError> {
        let bounds = Self { min, max };
        bounds.validate()?;
        Ok(bounds)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.min.is_finite() || !self.max.is_finite() || self.min < 0.0 || self.min >= self.max
        {
            return Err(ValidationError::InvalidBounds {
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }

    #[inline]
    pub fn contains(&self, price: f32) -> bool {
        price >= self.min && price <= self.max
    }

    /// Draw a price uniformly from the interval
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        rng.gen_range(self.min..=self.max)
    }
}

/// Ordered per-slot prices, every value inside its bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSchedule {
    prices: Vec<f32>,
}

impl PriceSchedule {
    /// Build a schedule from raw prices, validating each slot
    pub fn new(prices: Vec<f32>, bounds: &PriceBounds) -> Result<Self, ValidationError> {
        let schedule = Self { prices };
        schedule.validate_bounds(bounds)?;
        Ok(schedule)
    }

    /// Single random price replicated across all slots
    pub fn uniform<R: Rng + ?Sized>(slots: usize, bounds: &PriceBounds, rng: &mut R) -> Self {
        let price = bounds.sample(rng);
        Self {
            prices: vec![price; slots],
        }
    }

    /// Copy of this schedule with `slot` overwritten by `price`
    pub fn with_slot(
        &self,
        slot: usize,
        price: f32,
        bounds: &PriceBounds,
    ) -> Result<Self, ValidationError> {
        if slot >= self.prices.len() {
            return Err(ValidationError::SlotCountMismatch {
                expected: self.prices.len(),
                actual: slot + 1,
            });
        }
        if !bounds.contains(price) {
            return Err(ValidationError::PriceOutOfBounds {
                slot,
                price,
                min: bounds.min,
                max: bounds.max,
            });
        }
        let mut prices = self.prices.clone();
        prices[slot] = price;
        Ok(Self { prices })
    }

    /// Check slot count and bounds of an incoming schedule
    pub fn validate(&self, slots: usize, bounds: &PriceBounds) -> Result<(), ValidationError> {
        if self.prices.len() != slots {
            return Err(ValidationError::SlotCountMismatch {
                expected: slots,
                actual: self.prices.len(),
            });
        }
        self.validate_bounds(bounds)
    }

    fn validate_bounds(&self, bounds: &PriceBounds) -> Result<(), ValidationError> {
        for (slot, &price) in self.prices.iter().enumerate() {
            if !bounds.contains(price) {
                return Err(ValidationError::PriceOutOfBounds {
                    slot,
                    price,
                    min: bounds.min,
                    max: bounds.max,
                });
            }
        }
        Ok(())
    }

    #[inline]
    pub fn prices(&self) -> &[f32] {
        &self.prices
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl fmt::Display for PriceSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, price) in self.prices.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{price:.4}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_bounds_reject_inverted() {
        assert!(PriceBounds::new(1.5, 0.5).is_err());
        assert!(PriceBounds::new(-0.1, 0.5).is_err());
        assert!(PriceBounds::new(0.5, f32::INFINITY).is_err());
        assert!(PriceBounds::new(0.5, 1.5).is_ok());
    }

    #[test]
    fn test_uniform_schedule_within_bounds() {
        let bounds = PriceBounds::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let schedule = PriceSchedule::uniform(4, &bounds, &mut rng);
            assert_eq!(schedule.len(), 4);
            let first = schedule.prices()[0];
            assert!(schedule.prices().iter().all(|&p| p == first));
            assert!(schedule.validate(4, &bounds).is_ok());
        }
    }

    #[test]
    fn test_with_slot_keeps_other_slots_identical() {
        let bounds = PriceBounds::default();
        let source = PriceSchedule::new(vec![0.8, 1.0, 1.2, 0.6], &bounds).unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        for slot in 0..source.len() {
            let price = bounds.sample(&mut rng);
            let candidate = source.with_slot(slot, price, &bounds).unwrap();
            assert_eq!(candidate.prices()[slot], price);
            for other in (0..source.len()).filter(|&i| i != slot) {
                assert_eq!(
                    candidate.prices()[other].to_bits(),
                    source.prices()[other].to_bits()
                );
            }
        }
    }

    #[test]
    fn test_with_slot_rejects_out_of_range() {
        let bounds = PriceBounds::default();
        let source = PriceSchedule::new(vec![1.0; 4], &bounds).unwrap();
        assert!(matches!(
            source.with_slot(4, 1.0, &bounds),
            Err(ValidationError::SlotCountMismatch { .. })
        ));
        assert!(matches!(
            source.with_slot(0, 2.0, &bounds),
            Err(ValidationError::PriceOutOfBounds { slot: 0, .. })
        ));
    }

    #[test]
    fn test_new_rejects_out_of_bounds_price() {
        let bounds = PriceBounds::default();
        let err = PriceSchedule::new(vec![0.8, 1.6], &bounds).unwrap_err();
        assert_eq!(
            err,
            ValidationError::PriceOutOfBounds {
                slot: 1,
                price: 1.6,
                min: 0.5,
                max: 1.5
            }
        );
    }

    #[test]
    fn test_validate_slot_count() {
        let bounds = PriceBounds::default();
        let schedule = PriceSchedule::new(vec![1.0; 3], &bounds).unwrap();
        assert!(schedule.validate(4, &bounds).is_err());
    }

    #[test]
    fn test_display() {
        let bounds = PriceBounds::default();
        let schedule = PriceSchedule::new(vec![0.5, 1.5], &bounds).unwrap();
        assert_eq!(schedule.to_string(), "(0.5000, 1.5000)");
    }
}
