//! Node configuration loaded from YAML.
//!
//! The configuration is read once at startup, validated, and then shared
//! read-only with the sync cycle for the lifetime of the process.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::zenoh_sink::location_key;

/// Environment variable that overrides `api_key` from the config file.
pub const API_KEY_ENV: &str = "OPENWEATHERMAP_API_KEY";

/// Reporting language used when a city does not set one.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Root configuration of the weather node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// OpenWeatherMap API key (opaque)
    #[serde(default)]
    pub api_key: String,

    /// Publisher identifier, second segment of every key expression
    #[serde(default = "default_publisher_id")]
    pub publisher_id: String,

    /// Zone, first segment of every key expression
    #[serde(default = "default_zone")]
    pub zone: String,

    /// Base URL of the OpenWeatherMap 2.5 API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Interval between current-weather passes in seconds
    #[serde(default = "default_current_interval_secs")]
    pub current_interval_secs: u64,

    /// Forecast pass settings
    #[serde(default)]
    pub forecast: ForecastConfig,

    /// Interval between node liveness heartbeats in seconds
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// Cities to poll, in publishing order
    #[serde(default)]
    pub cities: Vec<CityEntry>,
}

/// Forecast pass settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_forecast_interval_secs")]
    pub interval_secs: u64,

    #[serde(default)]
    pub kind: ForecastKind,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_forecast_interval_secs(),
            kind: ForecastKind::default(),
        }
    }
}

/// Which OpenWeatherMap forecast product to request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastKind {
    /// 16 day forecast, one entry per day
    #[default]
    Daily,
    /// 5 day forecast, one entry every three hours
    ThreeHourly,
}

/// A city as written in the config file: either a bare name or a map
/// with per-city attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CityEntry {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        language: Option<String>,
    },
}

/// A configured location with its resolved attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// City name as understood by the weather service
    pub name: String,
    /// Two-letter reporting language
    pub language: String,
}

impl Location {
    pub fn new(name: impl Into<String>, language: &str) -> Self {
        let language = language.trim();
        Self {
            name: name.into(),
            language: if language.is_empty() {
                DEFAULT_LANGUAGE.to_string()
            } else {
                language.to_string()
            },
        }
    }
}

impl From<&CityEntry> for Location {
    fn from(entry: &CityEntry) -> Self {
        match entry {
            CityEntry::Name(name) => Location::new(name.trim(), ""),
            CityEntry::Detailed { name, language } => {
                Location::new(name.trim(), language.as_deref().unwrap_or(""))
            }
        }
    }
}

fn default_publisher_id() -> String {
    "openweathermap".to_string()
}

fn default_zone() -> String {
    "local".to_string()
}

fn default_base_url() -> String {
    "https://api.openweathermap.org/data/2.5".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_current_interval_secs() -> u64 {
    3600
}

fn default_forecast_interval_secs() -> u64 {
    6 * 3600
}

fn default_heartbeat_interval_secs() -> u64 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            publisher_id: default_publisher_id(),
            zone: default_zone(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            current_interval_secs: default_current_interval_secs(),
            forecast: ForecastConfig::default(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            cities: Vec::new(),
        }
    }
}

impl Config {
    /// Load, apply the API key override, and validate a YAML config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        let mut config = Self::parse(&contents)?;
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                log::info!("Using API key from {}", API_KEY_ENV);
                config.api_key = key;
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string without validating it.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Check the invariants the sync cycle relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "api_key is empty (set it in the config file or {})",
                API_KEY_ENV
            )));
        }
        if self.publisher_id.trim().is_empty() {
            return Err(ConfigError::Invalid("publisher_id is empty".to_string()));
        }
        if self.cities.is_empty() {
            return Err(ConfigError::Invalid("no cities configured".to_string()));
        }
        // Each city owns its key segment; names that sanitize to the same
        // segment would overwrite each other's values and status.
        let mut seen: HashMap<String, String> = HashMap::new();
        for location in self.locations() {
            if location.name.is_empty() {
                return Err(ConfigError::Invalid("city name is empty".to_string()));
            }
            let key = location_key(&location.name);
            if let Some(previous) = seen.insert(key.clone(), location.name.clone()) {
                return Err(if previous.eq_ignore_ascii_case(&location.name) {
                    ConfigError::Invalid(format!("city '{}' is configured twice", location.name))
                } else {
                    ConfigError::Invalid(format!(
                        "cities '{}' and '{}' share the key segment '{}'",
                        previous, location.name, key
                    ))
                });
            }
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be > 0".to_string()));
        }
        if self.current_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "current_interval_secs must be > 0".to_string(),
            ));
        }
        if self.forecast.enabled && self.forecast.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "forecast.interval_secs must be > 0".to_string(),
            ));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "heartbeat_interval_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Configured cities resolved into locations, in config order.
    pub fn locations(&self) -> Vec<Location> {
        self.cities.iter().map(Location::from).collect()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn current_interval(&self) -> Duration {
        Duration::from_secs(self.current_interval_secs)
    }

    pub fn forecast_interval(&self) -> Duration {
        Duration::from_secs(self.forecast.interval_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
