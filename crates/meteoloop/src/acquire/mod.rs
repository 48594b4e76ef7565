//! Data acquisition
//!
//! Fetches raw observations for every registered sensor from the primary
//! source and, when configured, the secondary enrichment source. Every fetch
//! is isolated: a failure costs exactly that sensor's reading for that tick.

mod openmeteo;
mod openweather;

pub use openmeteo::{parse_forecast, OpenMeteoClient, PrimaryPayload};
pub use openweather::{parse_weather, OpenWeatherClient, SecondaryPayload};

use crate::combiner;
use crate::config::Config;
use crate::reading::Reading;
use crate::registry::{Sensor, SensorRegistry};
use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned status {0}")]
    Status(u16),

    #[error("Malformed upstream response: {0}")]
    Malformed(String),

    #[error("Missing field in upstream response: {0}")]
    MissingField(&'static str),

    #[error("Fetch timed out after {0:?}")]
    Timeout(Duration),
}

pub type Result<T> = std::result::Result<T, FetchError>;

/// An upstream provider queried by sensor coordinate
#[async_trait]
pub trait UpstreamSource: Send + Sync {
    type Payload: Send;

    /// Short provider name used in log lines
    fn name(&self) -> &'static str;

    async fn fetch(&self, sensor: &Sensor) -> Result<Self::Payload>;
}

pub type PrimarySource = Arc<dyn UpstreamSource<Payload = PrimaryPayload>>;
pub type SecondarySource = Arc<dyn UpstreamSource<Payload = SecondaryPayload>>;

/// Shared HTTP client for the upstream sources, bounded by the transport timeout
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Fetch with a hard deadline so a source that never resolves counts as failed
async fn fetch_with_deadline<P: Send>(
    source: &dyn UpstreamSource<Payload = P>,
    sensor: &Sensor,
    deadline: Duration,
) -> Result<P> {
    match tokio::time::timeout(deadline, source.fetch(sensor)).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout(deadline)),
    }
}

pub struct Acquirer {
    registry: SensorRegistry,
    primary: PrimarySource,
    secondary: Option<SecondarySource>,
    fetch_timeout: Duration,
}

impl Acquirer {
    pub fn new(
        registry: SensorRegistry,
        primary: PrimarySource,
        secondary: Option<SecondarySource>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            primary,
            secondary,
            fetch_timeout,
        }
    }

    /// Build the HTTP-backed acquirer described by `config`.
    ///
    /// The secondary source is only wired when an API key is configured.
    pub fn from_config(config: &Config, registry: SensorRegistry) -> Result<Self> {
        let client = http_client(config.fetch_timeout())?;
        let primary: PrimarySource = Arc::new(OpenMeteoClient::new(
            client.clone(),
            config.primary.base_url.clone(),
        ));
        let secondary = config.secondary.api_key.as_ref().map(|key| {
            Arc::new(OpenWeatherClient::new(
                client.clone(),
                config.secondary.base_url.clone(),
                key.clone(),
            )) as SecondarySource
        });

        if secondary.is_none() {
            log::info!("No OpenWeather API key configured, enrichment disabled");
        }

        Ok(Self::new(
            registry,
            primary,
            secondary,
            config.fetch_timeout(),
        ))
    }

    pub fn registry(&self) -> &SensorRegistry {
        &self.registry
    }

    /// Primary fetch for one sensor; `None` means no reading this tick
    pub async fn fetch_primary(&self, sensor: &Sensor) -> Option<PrimaryPayload> {
        match fetch_with_deadline(self.primary.as_ref(), sensor, self.fetch_timeout).await {
            Ok(payload) => Some(payload),
            Err(e) => {
                log::warn!(
                    "{} fetch failed for {} ({}): {}",
                    self.primary.name(),
                    sensor.city,
                    sensor.id,
                    e
                );
                None
            }
        }
    }

    /// Best-effort enrichment fetch; `None` when disabled or failed
    pub async fn fetch_secondary(&self, sensor: &Sensor) -> Option<SecondaryPayload> {
        let source = self.secondary.as_ref()?;
        match fetch_with_deadline(source.as_ref(), sensor, self.fetch_timeout).await {
            Ok(payload) => Some(payload),
            Err(e) => {
                log::warn!(
                    "{} enrichment failed for {} ({}): {}",
                    source.name(),
                    sensor.city,
                    sensor.id,
                    e
                );
                None
            }
        }
    }

    /// Fetch both sources for one sensor concurrently and combine them
    pub async fn acquire(&self, sensor: &Sensor) -> Option<Reading> {
        let observed_at = Utc::now();
        let (primary, secondary) =
            tokio::join!(self.fetch_primary(sensor), self.fetch_secondary(sensor));
        combiner::combine(sensor, primary, secondary, observed_at)
    }

    /// One acquisition tick across the whole registry.
    ///
    /// Readings come back in registry order; sensors whose primary fetch
    /// failed are simply absent.
    pub async fn tick(&self) -> Vec<Reading> {
        let results = join_all(self.registry.iter().map(|sensor| self.acquire(sensor))).await;
        results.into_iter().flatten().collect()
    }
}
