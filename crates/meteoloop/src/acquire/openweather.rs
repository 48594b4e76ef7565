//! OpenWeather client (secondary, enrichment-only source)

use super::{FetchError, Result, UpstreamSource};
use crate::registry::Sensor;
use async_trait::async_trait;
use serde::Deserialize;

/// Raw enrichment observation for one sensor
#[derive(Debug, Clone, PartialEq)]
pub struct SecondaryPayload {
    pub city: Option<String>,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub condition: String,
}

#[derive(Debug, Deserialize)]
struct WeatherResponse {
    name: Option<String>,
    main: Option<MainBlock>,
    #[serde(default)]
    weather: Vec<ConditionEntry>,
}

#[derive(Debug, Deserialize)]
struct MainBlock {
    temp: f64,
    humidity: f64,
    pressure: f64,
}

#[derive(Debug, Deserialize)]
struct ConditionEntry {
    description: String,
}

/// Parse an OpenWeather current-weather body
pub fn parse_weather(body: &[u8]) -> Result<SecondaryPayload> {
    let response: WeatherResponse =
        serde_json::from_slice(body).map_err(|e| FetchError::Malformed(e.to_string()))?;
    let main = response.main.ok_or(FetchError::MissingField("main"))?;
    let condition = response
        .weather
        .into_iter()
        .next()
        .ok_or(FetchError::MissingField("weather"))?
        .description;

    Ok(SecondaryPayload {
        city: response.name.filter(|n| !n.is_empty()),
        temperature: main.temp,
        humidity: main.humidity,
        pressure: main.pressure,
        condition,
    })
}

pub struct OpenWeatherClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenWeatherClient {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl UpstreamSource for OpenWeatherClient {
    type Payload = SecondaryPayload;

    fn name(&self) -> &'static str {
        "openweather"
    }

    async fn fetch(&self, sensor: &Sensor) -> Result<SecondaryPayload> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("lat", sensor.lat.to_string()),
                ("lon", sensor.lon.to_string()),
                ("units", "metric".to_string()),
                ("appid", self.api_key.clone()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        parse_weather(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_weather() {
        let body = br#"{
            "coord": {"lon": 139.65, "lat": 35.68},
            "weather": [{"id": 500, "main": "Rain", "description": "light rain", "icon": "10d"}],
            "main": {"temp": 18.3, "feels_like": 18.0, "pressure": 1009, "humidity": 81},
            "name": "Tokyo"
        }"#;
        let payload = parse_weather(body).unwrap();
        assert_eq!(payload.city.as_deref(), Some("Tokyo"));
        assert_eq!(payload.condition, "light rain");
        assert_eq!(payload.pressure, 1009.0);
        assert_eq!(payload.humidity, 81.0);
    }

    #[test]
    fn test_empty_weather_list_is_failure() {
        let body = br#"{"weather": [], "main": {"temp": 1.0, "pressure": 1000, "humidity": 10}}"#;
        assert!(matches!(
            parse_weather(body),
            Err(FetchError::MissingField("weather"))
        ));
    }

    #[test]
    fn test_unauthorized_body_is_failure() {
        let body = br#"{"cod": 401, "message": "Invalid API key"}"#;
        assert!(parse_weather(body).is_err());
    }
}
