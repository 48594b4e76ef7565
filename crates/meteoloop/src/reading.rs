//! Canonical weather reading and its JSON wire format
//!
//! The same JSON shape is used on the broadcast channel, in history replies
//! and inside `weather-update` events sent to viewers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Units attached to the numeric fields of a [`Reading`]
pub mod units {
    pub const TEMPERATURE: &str = "°C";
    pub const HUMIDITY: &str = "%";
    pub const PRESSURE: &str = "hPa";
    pub const WIND_SPEED: &str = "km/h";
}

/// Name of the live update event pushed to viewers
pub const WEATHER_UPDATE_EVENT: &str = "weather-update";

/// Optional fields contributed by the secondary source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrichment {
    /// Station name reported by the secondary source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// Short condition description, e.g. "light rain"
    pub condition: String,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
}

/// One immutable observation for one sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub sensor_id: String,
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
    /// °C
    pub temperature: f64,
    /// Relative humidity, %
    pub humidity: f64,
    /// Surface pressure, hPa
    pub pressure: f64,
    /// km/h
    pub wind_speed: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(
        default,
        alias = "openWeather",
        skip_serializing_if = "Option::is_none"
    )]
    pub enrichment: Option<Enrichment>,
}

impl Reading {
    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Envelope for frames on the viewer stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum LiveEvent {
    WeatherUpdate(Reading),
}

impl LiveEvent {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::reading;
    use super::*;

    #[test]
    fn test_camel_case_field_names() {
        let value = serde_json::to_value(reading("sensor-1", 0, 21.5)).unwrap();
        assert_eq!(value["sensorId"], "sensor-1");
        assert_eq!(value["windSpeed"], 5.0);
        assert!(value.get("enrichment").is_none());
        assert!(value["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_accepts_open_weather_alias() {
        let json = r#"{
            "sensorId": "sensor-2",
            "city": "London",
            "latitude": 51.5074,
            "longitude": -0.1278,
            "temperature": 15.0,
            "humidity": 70,
            "pressure": 1012,
            "windSpeed": 8.1,
            "timestamp": "2024-05-01T10:00:00.000Z",
            "openWeather": {
                "city": "London",
                "temperature": 14.2,
                "humidity": 72,
                "pressure": 1011,
                "condition": "overcast clouds"
            }
        }"#;
        let parsed = Reading::from_json_bytes(json.as_bytes()).unwrap();
        let enrichment = parsed.enrichment.unwrap();
        assert_eq!(enrichment.condition, "overcast clouds");
        assert_eq!(parsed.humidity, 70.0);
    }

    #[test]
    fn test_live_event_envelope() {
        let event = LiveEvent::WeatherUpdate(reading("sensor-3", 10, 18.0));
        let text = event.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["event"], WEATHER_UPDATE_EVENT);
        assert_eq!(value["data"]["sensorId"], "sensor-3");
        assert_eq!(LiveEvent::from_json(&text).unwrap(), event);
    }

    #[test]
    fn test_rejects_missing_fields() {
        let json = r#"{"sensorId": "sensor-1", "temperature": 12.0}"#;
        assert!(Reading::from_json_bytes(json.as_bytes()).is_err());
    }
}
