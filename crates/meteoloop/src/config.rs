//! Runtime configuration
//!
//! Loaded from an optional YAML file. Every field has a default, so an empty
//! document yields the built-in five-sensor setup.

use crate::registry::{default_sensors, Sensor, SensorRegistry};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default Open-Meteo forecast endpoint
pub const OPEN_METEO_URL: &str = "https://api.open-meteo.com/v1/forecast";

/// Default OpenWeather current-weather endpoint
pub const OPEN_WEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

/// Default Zenoh router for the split publish/serve deployment
pub const DEFAULT_ZENOH_ENDPOINT: &str = "tcp/127.0.0.1:7447";

/// Default key expression of the broadcast channel
pub const DEFAULT_CHANNEL_KEY: &str = "meteoloop/weather-updates";

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seconds between acquisition ticks
    pub interval_secs: u64,
    /// Transport timeout for a single upstream fetch
    pub fetch_timeout_secs: u64,
    /// Readings retained per sensor in the history store (M)
    pub history_capacity: usize,
    /// Points kept per sensor in a viewer's sliding window (W)
    pub window_capacity: usize,
    /// Outbound queue depth for each connected viewer
    pub session_buffer: usize,
    pub http_port: u16,
    /// Router the `publish` and `serve` processes connect to
    pub zenoh_endpoint: String,
    pub channel_key: String,
    pub sensors: Vec<Sensor>,
    pub primary: PrimaryConfig,
    pub secondary: SecondaryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            fetch_timeout_secs: 5,
            history_capacity: 100,
            window_capacity: 20,
            session_buffer: 64,
            http_port: 3000,
            zenoh_endpoint: DEFAULT_ZENOH_ENDPOINT.to_string(),
            channel_key: DEFAULT_CHANNEL_KEY.to_string(),
            sensors: default_sensors(),
            primary: PrimaryConfig::default(),
            secondary: SecondaryConfig::default(),
        }
    }
}

/// Primary (required) upstream source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimaryConfig {
    pub base_url: String,
}

impl Default for PrimaryConfig {
    fn default() -> Self {
        Self {
            base_url: OPEN_METEO_URL.to_string(),
        }
    }
}

/// Secondary (enrichment) upstream source. Disabled without an API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecondaryConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl Default for SecondaryConfig {
    fn default() -> Self {
        Self {
            base_url: OPEN_WEATHER_URL.to_string(),
            api_key: None,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Apply `OPENWEATHER_API_KEY`, `PORT` and friends on top of the file values
    pub fn apply_env(mut self) -> Self {
        if let Ok(key) = std::env::var("OPENWEATHER_API_KEY") {
            if !key.trim().is_empty() {
                self.secondary.api_key = Some(key);
            }
        }
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            self.http_port = port;
        }
        if let Ok(endpoint) = std::env::var("ZENOH_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                self.zenoh_endpoint = endpoint;
            }
        }
        self
    }

    /// Check the values the pipeline cannot run with.
    ///
    /// A zero history or window capacity is allowed and means nothing is retained.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::Invalid("interval_secs must be > 0".into()));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid("fetch_timeout_secs must be > 0".into()));
        }
        if self.session_buffer == 0 {
            return Err(ConfigError::Invalid("session_buffer must be > 0".into()));
        }
        if self.zenoh_endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("zenoh_endpoint must not be empty".into()));
        }
        if self.channel_key.trim().is_empty() {
            return Err(ConfigError::Invalid("channel_key must not be empty".into()));
        }
        self.registry()?;
        Ok(())
    }

    pub fn registry(&self) -> Result<SensorRegistry, ConfigError> {
        SensorRegistry::new(self.sensors.clone()).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.interval_secs, 10);
        assert_eq!(config.history_capacity, 100);
        assert_eq!(config.window_capacity, 20);
        assert_eq!(config.sensors.len(), 5);
        assert_eq!(config.zenoh_endpoint, DEFAULT_ZENOH_ENDPOINT);
        assert!(config.secondary.api_key.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_override() {
        let yaml = r#"
interval_secs: 30
history_capacity: 50
zenoh_endpoint: tcp/10.0.0.2:7447
sensors:
  - id: lab
    city: Lab
    lat: 1.5
    lon: 2.5
secondary:
  api_key: secret
"#;
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.interval_secs, 30);
        assert_eq!(config.history_capacity, 50);
        assert_eq!(config.window_capacity, 20);
        assert_eq!(config.zenoh_endpoint, "tcp/10.0.0.2:7447");
        assert_eq!(config.sensors.len(), 1);
        assert_eq!(config.secondary.api_key.as_deref(), Some("secret"));
        assert_eq!(config.secondary.base_url, OPEN_WEATHER_URL);
        assert_eq!(config.registry().unwrap().len(), 1);
    }

    #[test]
    fn test_zero_capacity_is_valid() {
        let config = Config::parse("history_capacity: 0\nwindow_capacity: 0\n").unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = Config::parse("interval_secs: 0\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_duplicate_sensors_rejected() {
        let yaml = r#"
sensors:
  - { id: a, city: A, lat: 0.0, lon: 0.0 }
  - { id: a, city: B, lat: 1.0, lon: 1.0 }
"#;
        let config = Config::parse(yaml).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unservable_sensor_id_rejected() {
        let yaml = r#"
sensors:
  - { id: 'lab/1', city: Lab, lat: 0.0, lon: 0.0 }
"#;
        let config = Config::parse(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("lab/1")));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meteoloop.yaml");
        std::fs::write(&path, "http_port: 8081\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.http_port, 8081);
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_file("/nonexistent/meteoloop.yaml");
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_invalid_yaml() {
        let result = Config::parse("not: [valid: yaml: {{");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
