//! Merges primary and secondary payloads into one canonical [`Reading`].

use crate::acquire::{PrimaryPayload, SecondaryPayload};
use crate::reading::{Enrichment, Reading};
use crate::registry::Sensor;
use chrono::{DateTime, Utc};

/// Produce the reading for one sensor and tick.
///
/// The primary payload is required: without it there is no reading. The
/// secondary payload only ever adds the enrichment block.
pub fn combine(
    sensor: &Sensor,
    primary: Option<PrimaryPayload>,
    secondary: Option<SecondaryPayload>,
    observed_at: DateTime<Utc>,
) -> Option<Reading> {
    let primary = primary?;

    Some(Reading {
        sensor_id: sensor.id.clone(),
        city: sensor.city.clone(),
        latitude: sensor.lat,
        longitude: sensor.lon,
        temperature: primary.temperature,
        humidity: primary.humidity,
        pressure: primary.pressure,
        wind_speed: primary.wind_speed,
        timestamp: observed_at,
        enrichment: secondary.map(|s| Enrichment {
            city: s.city,
            condition: s.condition,
            temperature: s.temperature,
            humidity: s.humidity,
            pressure: s.pressure,
        }),
    })
}
