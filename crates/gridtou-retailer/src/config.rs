//! Retailer configuration
//!
//! Layered: compiled defaults, then an optional config file (`retailer.toml`
//! or the path in `GRIDTOU_RETAILER_CONFIG`), then `GRIDTOU_RETAILER_*`
//! environment variables (`__` separates nested keys, e.g.
//! `GRIDTOU_RETAILER_ANNEALING__SEED=7`).

use config::{Config, Environment, File, FileFormat};
use gridtou_common::{
    CostModel, GridError, PriceBounds, Result, DEFAULT_POPULATION, DEFAULT_PORT, DEFAULT_SLOTS,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "GRIDTOU_RETAILER_CONFIG";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "GRIDTOU_RETAILER";

/// Retailer service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetailerConfig {
    /// Listen host
    pub host: String,
    /// Listen port
    pub port: u16,
    /// Number of consumers that must join before the search starts
    pub population: usize,
    /// Time slots per schedule
    pub slots: usize,
    /// Price bounds for every slot
    pub bounds: PriceBounds,
    /// Profit formula coefficients
    pub cost: CostModel,
    /// Annealing parameters
    pub annealing: AnnealingSettings,
}

impl Default for RetailerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            population: DEFAULT_POPULATION,
            slots: DEFAULT_SLOTS,
            bounds: PriceBounds::default(),
            cost: CostModel::default(),
            annealing: AnnealingSettings::default(),
        }
    }
}

impl RetailerConfig {
    /// Load configuration from `.env`, the config file and the environment
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "retailer".to_string());
        let settings = Config::builder()
            .add_source(File::with_name(&path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Self = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document on top of the defaults
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        let cfg: Self = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reject settings the search cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.population == 0 {
            return Err(GridError::Config("population must be at least 1".into()));
        }
        if self.slots == 0 {
            return Err(GridError::Config("slots must be at least 1".into()));
        }
        self.bounds
            .validate()
            .map_err(|e| GridError::Config(e.to_string()))?;
        if self.cost.a < 0.0 || self.cost.b < 0.0 || self.cost.weight < 0.0 {
            return Err(GridError::Config(format!(
                "cost coefficients must be non-negative: {:?}",
                self.cost
            )));
        }
        self.annealing.validate()
    }
}

/// Simulated annealing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnealingSettings {
    /// Starting temperature (e^-1)
    pub initial_temperature: f32,
    /// The search stops once the temperature is at or below this (e^-5)
    pub end_temperature: f32,
    /// Round index before the first cooling; incremented before each use
    /// of `ln(k)`, so 2 makes the first divisor ln 3
    pub initial_round_index: u32,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
    /// Per-round wait limit. Unset means wait forever for every consumer.
    pub round_timeout_ms: Option<u64>,
}

impl Default for AnnealingSettings {
    fn default() -> Self {
        Self {
            initial_temperature: (-1f32).exp(),
            end_temperature: (-5f32).exp(),
            initial_round_index: 2,
            seed: None,
            round_timeout_ms: None,
        }
    }
}

impl AnnealingSettings {
    pub fn round_timeout(&self) -> Option<Duration> {
        self.round_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.end_temperature > 0.0) || !self.initial_temperature.is_finite() {
            return Err(GridError::Config(format!(
                "temperatures must be positive and finite: initial={}, end={}",
                self.initial_temperature, self.end_temperature
            )));
        }
        if self.end_temperature >= self.initial_temperature {
            return Err(GridError::Config(format!(
                "end temperature {} must be below initial temperature {}",
                self.end_temperature, self.initial_temperature
            )));
        }
        // ln(k) <= 1 for k < 3 would stall or raise the temperature
        if self.initial_round_index < 2 {
            return Err(GridError::Config(format!(
                "initial_round_index must be at least 2, got {}",
                self.initial_round_index
            )));
        }
        if self.round_timeout_ms == Some(0) {
            return Err(GridError::Config("round_timeout_ms must be positive".into()));
        }
        Ok(())
    }
}
