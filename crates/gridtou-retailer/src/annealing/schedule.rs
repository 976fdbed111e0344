//! Logarithmic cooling schedule

use crate::config::AnnealingSettings;
use gridtou_common::{GridError, Result};

/// Temperature that shrinks by `ln(k)` after every sweep
#[derive(Debug, Clone, PartialEq)]
pub struct CoolingSchedule {
    temperature: f32,
    end_temperature: f32,
    round_index: u32,
}

impl CoolingSchedule {
    /// `round_index` must be at least 2: the index is incremented before use,
    /// and ln(k) > 1 only from k = 3 on.
    pub fn new(temperature: f32, end_temperature: f32, round_index: u32) -> Result<Self> {
        if round_index < 2 {
            return Err(GridError::Config(format!(
                "cooling round index must be at least 2, got {round_index}"
            )));
        }
        if !(end_temperature > 0.0) || !temperature.is_finite() {
            return Err(GridError::Config(format!(
                "invalid temperatures: start={temperature}, end={end_temperature}"
            )));
        }
        Ok(Self {
            temperature,
            end_temperature,
            round_index,
        })
    }

    pub fn from_settings(settings: &AnnealingSettings) -> Result<Self> {
        Self::new(
            settings.initial_temperature,
            settings.end_temperature,
            settings.initial_round_index,
        )
    }

    /// The search keeps sweeping while this holds
    #[inline]
    pub fn is_active(&self) -> bool {
        self.temperature > self.end_temperature
    }

    /// Advance k and divide the temperature by ln(k). Returns the new value.
    pub fn cool(&mut self) -> f32 {
        self.round_index += 1;
        self.temperature /= (self.round_index as f32).ln();
        self.temperature
    }

    #[inline]
    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    #[inline]
    pub fn end_temperature(&self) -> f32 {
        self.end_temperature
    }

    #[inline]
    pub fn round_index(&self) -> u32 {
        self.round_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_schedule() -> CoolingSchedule {
        CoolingSchedule::from_settings(&AnnealingSettings::default()).unwrap()
    }

    #[test]
    fn test_first_cooling_divides_by_ln3() {
        let mut schedule = default_schedule();
        let start = schedule.temperature();
        let cooled = schedule.cool();
        assert_eq!(schedule.round_index(), 3);
        assert!((cooled - start / 3f32.ln()).abs() < 1e-7);
    }

    #[test]
    fn test_temperature_strictly_decreases_until_end() {
        let mut schedule = default_schedule();
        let mut sweeps = 0;
        let mut previous = schedule.temperature();
        while schedule.is_active() {
            let next = schedule.cool();
            assert!(next < previous);
            previous = next;
            sweeps += 1;
            assert!(sweeps < 100);
        }
        assert_eq!(sweeps, 8);
        assert!(schedule.temperature() <= schedule.end_temperature());
    }

    #[test]
    fn test_rejects_low_round_index() {
        assert!(CoolingSchedule::new(0.5, 0.01, 1).is_err());
        assert!(CoolingSchedule::new(0.5, 0.01, 0).is_err());
        assert!(CoolingSchedule::new(0.5, 0.0, 2).is_err());
        assert!(CoolingSchedule::new(0.5, 0.01, 2).is_ok());
    }

    #[test]
    fn test_inactive_when_starting_below_end() {
        let schedule = CoolingSchedule::new(0.001, 0.01, 2).unwrap();
        assert!(!schedule.is_active());
    }
}
