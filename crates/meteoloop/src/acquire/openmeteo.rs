//! Open-Meteo client (primary source)

use super::{FetchError, Result, UpstreamSource};
use crate::registry::Sensor;
use async_trait::async_trait;
use serde::Deserialize;

/// Variables requested from the `current` block
const CURRENT_FIELDS: &str = "temperature_2m,relative_humidity_2m,surface_pressure,wind_speed_10m";

/// Raw primary observation for one sensor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrimaryPayload {
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub wind_speed: f64,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current: Option<CurrentBlock>,
}

#[derive(Debug, Deserialize)]
struct CurrentBlock {
    temperature_2m: Option<f64>,
    relative_humidity_2m: Option<f64>,
    surface_pressure: Option<f64>,
    wind_speed_10m: Option<f64>,
}

impl ForecastResponse {
    fn into_payload(self) -> Result<PrimaryPayload> {
        let current = self.current.ok_or(FetchError::MissingField("current"))?;
        Ok(PrimaryPayload {
            temperature: current
                .temperature_2m
                .ok_or(FetchError::MissingField("temperature_2m"))?,
            humidity: current
                .relative_humidity_2m
                .ok_or(FetchError::MissingField("relative_humidity_2m"))?,
            pressure: current
                .surface_pressure
                .ok_or(FetchError::MissingField("surface_pressure"))?,
            wind_speed: current
                .wind_speed_10m
                .ok_or(FetchError::MissingField("wind_speed_10m"))?,
        })
    }
}

/// Parse an Open-Meteo forecast body into a primary payload
pub fn parse_forecast(body: &[u8]) -> Result<PrimaryPayload> {
    let response: ForecastResponse =
        serde_json::from_slice(body).map_err(|e| FetchError::Malformed(e.to_string()))?;
    response.into_payload()
}

pub struct OpenMeteoClient {
    client: reqwest::Client,
    base_url: String,
}

impl OpenMeteoClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl UpstreamSource for OpenMeteoClient {
    type Payload = PrimaryPayload;

    fn name(&self) -> &'static str {
        "open-meteo"
    }

    async fn fetch(&self, sensor: &Sensor) -> Result<PrimaryPayload> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("latitude", sensor.lat.to_string()),
                ("longitude", sensor.lon.to_string()),
                ("current", CURRENT_FIELDS.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        parse_forecast(&body)
    }
}
