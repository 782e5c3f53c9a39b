//! TOML configuration for the analyzer: service credentials, tariff window,
//! ZEV sensor roles, and cache behavior.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Battery-to-AC efficiency assumed when the config leaves it unset.
pub const DEFAULT_INVERTER_EFFICIENCY: f64 = 0.93;

/// Top-level configuration parsed from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Meter-data service endpoint and credentials.
    #[serde(default)]
    pub api: ApiConfig,
    /// Daily low-tariff window.
    #[serde(default)]
    pub low_tariff: LowTariffConfig,
    /// Sensor roles of the billing group.
    #[serde(default)]
    pub zev: ZevConfig,
    /// On-disk reading cache behavior.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Meter-data service endpoint and credentials; opaque to the analysis core.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
}

/// Daily low-tariff window over hours 0–23; `start_hour > end_hour` wraps
/// past midnight.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LowTariffConfig {
    pub start_hour: u32,
    pub end_hour: u32,
}

/// Sensor ids making up the billing group.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ZevConfig {
    /// Grid exchange meter.
    pub grid_meter_id: String,
    /// Production (inverter) meters.
    pub production_ids: Vec<String>,
    /// Battery system sensors.
    pub battery_ids: Vec<String>,
    /// Consumer sub-meters.
    pub consumer_ids: Vec<String>,
    /// Battery-to-AC efficiency in (0, 1]; 0 selects the default.
    pub inverter_efficiency: f64,
}

/// On-disk reading cache behavior.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Cache file location; derived from the config path when unset.
    pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug)]
pub struct ConfigError {
    /// Dotted field path (e.g., `"zev.inverter_efficiency"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {} — {}", self.field, self.message)
    }
}

impl Config {
    /// Parses a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is
    /// invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError {
            field: "config".to_string(),
            message: format!("cannot read \"{}\": {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown
    /// fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(s).map_err(|e| ConfigError {
            field: "toml".to_string(),
            message: e.to_string(),
        })?;
        config.zev.normalize();
        Ok(config)
    }

    /// Effective battery-to-AC efficiency, applying the default when unset.
    pub fn inverter_efficiency(&self) -> f64 {
        if self.zev.inverter_efficiency == 0.0 {
            DEFAULT_INVERTER_EFFICIENCY
        } else {
            self.zev.inverter_efficiency
        }
    }

    /// Validates field-level constraints and returns a list of errors.
    ///
    /// Returns an empty vector if the configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        let t = &self.low_tariff;
        if t.start_hour > 23 {
            errors.push(ConfigError {
                field: "low_tariff.start_hour".into(),
                message: "must be in 0..=23".into(),
            });
        }
        if t.end_hour > 23 {
            errors.push(ConfigError {
                field: "low_tariff.end_hour".into(),
                message: "must be in 0..=23".into(),
            });
        }

        let eff = self.zev.inverter_efficiency;
        if eff != 0.0 && !(eff > 0.0 && eff <= 1.0) {
            errors.push(ConfigError {
                field: "zev.inverter_efficiency".into(),
                message: format!("must be in (0, 1], got {eff}"),
            });
        }

        errors
    }

    /// Validates the ids an energy analysis needs on top of [`Self::validate`].
    pub fn validate_analysis(&self) -> Vec<ConfigError> {
        let mut errors = self.validate();

        if self.api.base_url.is_empty() {
            errors.push(ConfigError {
                field: "api.base_url".into(),
                message: "must not be empty".into(),
            });
        }
        if self.zev.grid_meter_id.is_empty() {
            errors.push(ConfigError {
                field: "zev.grid_meter_id".into(),
                message: "must not be empty".into(),
            });
        }
        if self.zev.consumer_ids.is_empty() {
            errors.push(ConfigError {
                field: "zev.consumer_ids".into(),
                message: "at least one consumer id is required".into(),
            });
        }

        errors
    }
}

impl ZevConfig {
    /// Strips trailing `# name` annotations from configured ids; the setup
    /// advisor emits them and users tend to paste them along.
    fn normalize(&mut self) {
        strip_annotation(&mut self.grid_meter_id);
        for id in self
            .production_ids
            .iter_mut()
            .chain(self.battery_ids.iter_mut())
            .chain(self.consumer_ids.iter_mut())
        {
            strip_annotation(id);
        }
    }
}

fn strip_annotation(id: &mut String) {
    let bare = id.split('#').next().unwrap_or("").trim();
    if bare.len() != id.len() {
        *id = bare.to_string();
    }
}
