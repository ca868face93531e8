use crate::aggregator::DEFAULT_MAX_TRANSACTION_ATTEMPTS;
use crate::recommendation::{
    DEFAULT_HISTORY_WINDOW_DAYS, DEFAULT_SLOT_INTERVAL_MIN, RecommendationSettings,
};
use crate::state::ServiceSettings;
use crate::store::StationStatus;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    #[serde(default)]
    pub server: Option<ServerSection>,
    #[serde(default)]
    pub recommendation: Option<RecommendationSection>,
    #[serde(default)]
    pub aggregation: Option<AggregationSection>,
    #[serde(default)]
    pub stations: Vec<StationSeed>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port to listen on (default: 8080)
    pub port: Option<u16>,
    /// Deadline applied to every request, in milliseconds (default: 5000)
    pub request_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RecommendationSection {
    /// Trailing window of arrivals counted for λ (default: 7)
    pub history_window_days: Option<u32>,
    /// Slot width in minutes (default: 15)
    pub slot_interval_min: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AggregationSection {
    /// Compare-and-swap attempts before a completion is reported as failed (default: 32)
    pub max_transaction_attempts: Option<u32>,
}

/// Station registered at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct StationSeed {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    Ok(config)
}

impl Config {
    /// Returns the configured log level, or `INFO` when unset or unrecognised.
    pub fn log_level(&self) -> tracing::Level {
        self.logging.level.parse().unwrap_or(tracing::Level::INFO)
    }

    /// Returns the server port (default: 8080)
    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    pub fn request_timeout(&self) -> Duration {
        let millis = self
            .server
            .as_ref()
            .and_then(|s| s.request_timeout_ms)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS);
        Duration::from_millis(millis)
    }

    pub fn recommendation_settings(&self) -> Result<RecommendationSettings, ConfigError> {
        let section = self.recommendation.as_ref();
        let days = section
            .and_then(|s| s.history_window_days)
            .unwrap_or(DEFAULT_HISTORY_WINDOW_DAYS);
        let interval = section
            .and_then(|s| s.slot_interval_min)
            .unwrap_or(DEFAULT_SLOT_INTERVAL_MIN);
        RecommendationSettings::new(days, interval)
            .map_err(|err| ConfigError::Invalid(err.to_string()))
    }

    pub fn max_transaction_attempts(&self) -> u32 {
        self.aggregation
            .as_ref()
            .and_then(|s| s.max_transaction_attempts)
            .unwrap_or(DEFAULT_MAX_TRANSACTION_ATTEMPTS)
    }

    pub fn service_settings(&self) -> Result<ServiceSettings, ConfigError> {
        Ok(ServiceSettings {
            recommendation: self.recommendation_settings()?,
            max_transaction_attempts: self.max_transaction_attempts(),
            request_timeout: self.request_timeout(),
        })
    }

    /// Startup stations with their parsed status, in file order.
    pub fn station_seeds(&self) -> Result<Vec<(String, StationStatus)>, ConfigError> {
        self.stations
            .iter()
            .map(|seed| {
                if seed.id.trim().is_empty() {
                    return Err(ConfigError::Invalid("station id is empty".to_string()));
                }
                let status: StationStatus = seed.status.parse().map_err(ConfigError::Invalid)?;
                Ok((seed.id.clone(), status))
            })
            .collect()
    }
}
