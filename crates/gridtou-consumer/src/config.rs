//! Consumer population configuration
//!
//! Same layering as the retailer: defaults, then `consumer.toml` (or the path
//! in `GRIDTOU_CONSUMER_CONFIG`), then `GRIDTOU_CONSUMER_*` variables.

use config::{Config, Environment, File, FileFormat};
use gridtou_common::response::DEFAULT_DEMAND_FACTOR;
use gridtou_common::{
    ConsumerProfile, GridError, PriceBounds, Result, DEFAULT_PORT, DEFAULT_SLOTS,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "GRIDTOU_CONSUMER_CONFIG";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "GRIDTOU_CONSUMER";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    pub retailer_host: String,
    pub retailer_port: u16,
    /// Expected slot count of every price signal
    pub slots: usize,
    /// Bounds every received price must respect
    pub bounds: PriceBounds,
    pub demand_factor: f32,
    /// One connection is opened per profile
    pub profiles: Vec<ConsumerProfile>,
    /// Connection attempts before giving up
    pub connect_attempts: u32,
    pub connect_retry_ms: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            retailer_host: "127.0.0.1".to_string(),
            retailer_port: DEFAULT_PORT,
            slots: DEFAULT_SLOTS,
            bounds: PriceBounds::default(),
            demand_factor: DEFAULT_DEMAND_FACTOR,
            profiles: ConsumerProfile::reference_profiles(),
            connect_attempts: 10,
            connect_retry_ms: 500,
        }
    }
}

impl ConsumerConfig {
    /// Load configuration from `.env`, the config file and the environment
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "consumer".to_string());
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

    pub fn retailer_addr(&self) -> String {
        format!("{}:{}", self.retailer_host, self.retailer_port)
    }

    pub fn connect_retry(&self) -> Duration {
        Duration::from_millis(self.connect_retry_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.slots == 0 {
            return Err(GridError::Config("slots must be at least 1".into()));
        }
        if self.profiles.is_empty() {
            return Err(GridError::Config("at least one consumer profile is required".into()));
        }
        if self.connect_attempts == 0 {
            return Err(GridError::Config("connect_attempts must be at least 1".into()));
        }
        if !(self.demand_factor > 0.0) {
            return Err(GridError::Config(format!(
                "demand_factor must be positive, got {}",
                self.demand_factor
            )));
        }
        self.bounds
            .validate()
            .map_err(|e| GridError::Config(e.to_string()))?;

        let mut ids = HashSet::new();
        for profile in &self.profiles {
            profile.validate(self.slots).map_err(|e| {
                GridError::Config(format!("profile {}: {e}", profile.consumer_id))
            })?;
            if !ids.insert(profile.consumer_id) {
                return Err(GridError::Config(format!(
                    "duplicate consumer id {}",
                    profile.consumer_id
                )));
            }
        }
        Ok(())
    }
}
