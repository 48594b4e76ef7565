//! Native viewer client
//!
//! Talks to a running `meteoloop serve` (or `run`) over its HTTP API and live
//! WebSocket stream, and feeds a [`ClientAggregator`] with both.

use crate::aggregator::{temperature_band, ClientAggregator, Series};
use crate::reading::{units, LiveEvent, Reading};
use crate::registry::{Sensor, SensorRegistry};
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};

#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("Server not reachable at {0}. Is it running?")]
    NotReachable(String),
    #[error("Request failed: {0}")]
    Request(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Live stream error: {0}")]
    Stream(String),
}

pub type Result<T> = std::result::Result<T, ViewerError>;

/// HTTP + WebSocket client for the viewer API
pub struct ViewerClient {
    base_url: String,
    client: reqwest::Client,
}

impl ViewerClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ViewerError::Request(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn ws_url(&self) -> String {
        let base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.base_url.clone()
        };
        format!("{}/ws", base)
    }

    /// Absolute API URL with each segment percent-encoded
    fn api_url(&self, segments: &[&str]) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| ViewerError::Request(format!("{}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| ViewerError::Request(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: reqwest::Url) -> Result<T> {
        let path = url.path().to_string();
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|_| ViewerError::NotReachable(self.base_url.clone()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ViewerError::Request(format!("GET {} returned {}", path, status)));
        }

        resp.json::<T>()
            .await
            .map_err(|e| ViewerError::InvalidResponse(e.to_string()))
    }

    /// List sensors via GET /api/sensors
    pub async fn sensors(&self) -> Result<Vec<Sensor>> {
        self.get_json(self.api_url(&["api", "sensors"])?).await
    }

    /// Read one sensor's history via GET /api/history/{id}
    pub async fn history(&self, sensor_id: &str) -> Result<Vec<Reading>> {
        self.get_json(self.api_url(&["api", "history", sensor_id])?)
            .await
    }

    /// Follow the live stream until shutdown.
    ///
    /// The stream is opened before history is pulled, and live events are
    /// held back until every sensor has been seeded, so nothing published in
    /// between is missed. `on_series` is called once per seeded sensor and
    /// then once per accepted live reading.
    pub async fn watch<F>(
        &self,
        window_capacity: usize,
        mut on_series: F,
        mut shutdown: watch::Receiver<()>,
    ) -> Result<()>
    where
        F: FnMut(&Series),
    {
        let ws_url = self.ws_url();
        let (stream, _) = connect_async(&ws_url)
            .await
            .map_err(|e| ViewerError::Stream(format!("{}: {}", ws_url, e)))?;
        log::info!("Connected to live stream at {}", ws_url);

        // Sink stays alive for the duration so the connection is not half-closed
        let (_sink, mut source) = stream.split();

        // Unbounded only for the seeding window; drained continuously afterwards
        let (tx, mut rx) = mpsc::unbounded_channel::<Reading>();
        let reader = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        let s: &str = text.as_ref();
                        if let Some(reading) = decode_frame(s) {
                            if tx.send(reading).is_err() {
                                break;
                            }
                        }
                    }
                    Ok(Message::Close(_)) => {
                        log::info!("Server closed the live stream");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        log::warn!("Live stream read error: {}", e);
                        break;
                    }
                }
            }
        });

        let result = self
            .follow(window_capacity, &mut on_series, &mut rx, &mut shutdown)
            .await;
        reader.abort();
        result
    }

    async fn follow<F>(
        &self,
        window_capacity: usize,
        on_series: &mut F,
        rx: &mut mpsc::UnboundedReceiver<Reading>,
        shutdown: &mut watch::Receiver<()>,
    ) -> Result<()>
    where
        F: FnMut(&Series),
    {
        let registry = SensorRegistry::new(self.sensors().await?)
            .map_err(|e| ViewerError::InvalidResponse(e.to_string()))?;
        let mut aggregator = ClientAggregator::new(&registry, window_capacity);

        for sensor in registry.iter() {
            let history = match self.history(&sensor.id).await {
                Ok(history) => history,
                Err(e) => {
                    log::warn!("No history for {}: {}", sensor.id, e);
                    Vec::new()
                }
            };
            log::debug!("Seeding {} with {} readings", sensor.id, history.len());
            on_series(&aggregator.seed(&sensor.id, &history));
        }

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    log::info!("Viewer shutting down...");
                    return Ok(());
                }

                reading = rx.recv() => {
                    let Some(reading) = reading else {
                        return Err(ViewerError::Stream("live stream ended".to_string()));
                    };
                    if let Some(series) = aggregator.apply(&reading) {
                        log::info!(
                            "{}: {}{} ({})",
                            reading.city,
                            reading.temperature,
                            units::TEMPERATURE,
                            temperature_band(reading.temperature).as_str()
                        );
                        on_series(&series);
                    }
                }
            }
        }
    }
}

/// Decode one text frame; malformed frames are logged and dropped
fn decode_frame(text: &str) -> Option<Reading> {
    match LiveEvent::from_json(text) {
        Ok(LiveEvent::WeatherUpdate(reading)) => Some(reading),
        Err(e) => {
            log::warn!("Dropping malformed live event: {}", e);
            None
        }
    }
}
