//! Configuration management for airworthy.
//!
//! Configuration is loaded with figment from defaults, an optional TOML
//! file and `AIRWORTHY_` environment variables. Nested keys use a double
//! underscore, e.g. `AIRWORTHY_AIRCRAFT__SEED_AFTT=1000.0`.

use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::aircraft::AircraftState;
use crate::error::{Error, Result};
use crate::status::HealthPolicy;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "airworthy";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "compliance.db";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `AIRWORTHY_`)
/// 2. TOML config file at `~/.config/airworthy/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Aircraft seed values for a new database.
    pub aircraft: AircraftConfig,
    /// Compliance scoring options.
    pub compliance: ComplianceConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/airworthy/compliance.db`
    pub database_path: Option<PathBuf>,
}

/// Aircraft identity and the hour meter a new database starts from.
///
/// Only consulted when the database has no aircraft yet; afterwards the
/// stored state wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AircraftConfig {
    /// Tail number.
    pub registration: String,
    /// Starting airframe total time, in hours. Quote it in TOML: `"1000.0"`.
    pub seed_aftt: Decimal,
    /// Starting cycle count.
    pub seed_cycles: u64,
}

/// Compliance scoring options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceConfig {
    /// Count tasks past their calendar due date as overdue in the health
    /// score. Off by default: only the hour meter decides.
    pub count_calendar_overdue: bool,
}

impl Default for AircraftConfig {
    fn default() -> Self {
        Self {
            registration: "N528RR".to_string(),
            seed_aftt: Decimal::ZERO,
            seed_cycles: 0,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file).nested())
            .merge(Env::prefixed("AIRWORTHY_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.aircraft.registration.trim().is_empty() {
            return Err(Error::ConfigValidation {
                message: "aircraft.registration must not be empty".to_string(),
            });
        }

        if self.aircraft.seed_aftt < Decimal::ZERO {
            return Err(Error::ConfigValidation {
                message: format!(
                    "aircraft.seed_aftt ({}) cannot be negative",
                    self.aircraft.seed_aftt
                ),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Aircraft state to seed an empty database with.
    #[must_use]
    pub fn seed_aircraft(&self) -> AircraftState {
        AircraftState::new(
            self.aircraft.registration.trim(),
            self.aircraft.seed_aftt,
            self.aircraft.seed_cycles,
        )
    }

    /// Health scoring policy.
    #[must_use]
    pub fn health_policy(&self) -> HealthPolicy {
        HealthPolicy {
            count_calendar_overdue: self.compliance.count_calendar_overdue,
        }
    }
}
