//! Configuration management for wheelport.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "wheelport";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "inventory.db";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `WHEELPORT_`)
/// 2. TOML config file at `~/.config/wheelport/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Booking configuration.
    pub booking: BookingConfig,
    /// Facility configuration.
    pub facility: FacilityConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the inventory database file.
    /// Defaults to `~/.local/share/wheelport/inventory.db`
    pub database_path: Option<PathBuf>,
}

/// Booking-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookingConfig {
    /// How long a unit may stay reserved without being scanned, in seconds.
    /// Set to 0 to never release holds automatically.
    pub hold_timeout_secs: u64,
    /// Refresh interval of the trip timer display in milliseconds.
    pub tick_interval_ms: u64,
}

/// Facility-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FacilityConfig {
    /// Where the user is, shown at the top of the map.
    pub current_location: String,
    /// Support phone number shown during a trip.
    pub support_contact: String,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            hold_timeout_secs: 15 * 60,
            tick_interval_ms: 1000,
        }
    }
}

impl Default for FacilityConfig {
    fn default() -> Self {
        Self {
            current_location: "Terminal 1 - Main Entrance".to_string(),
            support_contact: "1-800-HELP".to_string(),
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
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("WHEELPORT_").split("__"));

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
        if self.booking.tick_interval_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "tick_interval_ms must be greater than 0".to_string(),
            });
        }

        if self.facility.current_location.trim().is_empty() {
            return Err(Error::ConfigValidation {
                message: "current_location must not be empty".to_string(),
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

    /// Get the hold timeout as a Duration.
    #[must_use]
    pub fn hold_timeout(&self) -> Option<Duration> {
        if self.booking.hold_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.booking.hold_timeout_secs))
        }
    }

    /// Get the timer tick interval as a Duration.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.booking.tick_interval_ms)
    }
}
