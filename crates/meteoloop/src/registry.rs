//! Sensor registry
//!
//! The fixed, ordered set of sensors known to the pipeline. Built once at
//! startup from configuration and handed to every component that needs it.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Sensor registry is empty")]
    Empty,

    #[error("Duplicate sensor id: {0}")]
    DuplicateSensor(String),

    #[error("Invalid sensor id {0:?}: must be non-empty without '/', '*', '$', '?' or '#'")]
    InvalidId(String),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Static identity of one sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    pub id: String,
    pub city: String,
    pub lat: f64,
    pub lon: f64,
}

impl Sensor {
    pub fn new(id: &str, city: &str, lat: f64, lon: f64) -> Self {
        Self {
            id: id.to_string(),
            city: city.to_string(),
            lat,
            lon,
        }
    }
}

/// Whether a sensor id can be used as one URL path segment and one key chunk
pub fn is_valid_sensor_id(sensor_id: &str) -> bool {
    !sensor_id.is_empty() && !sensor_id.contains(['/', '*', '$', '?', '#'])
}

/// Built-in five-city registry
pub fn default_sensors() -> Vec<Sensor> {
    vec![
        Sensor::new("sensor-1", "New York", 40.7128, -74.0060),
        Sensor::new("sensor-2", "London", 51.5074, -0.1278),
        Sensor::new("sensor-3", "Tokyo", 35.6762, 139.6503),
        Sensor::new("sensor-4", "Sydney", -33.8688, 151.2093),
        Sensor::new("sensor-5", "Mumbai", 19.0760, 72.8777),
    ]
}

/// Immutable, ordered sensor list. Clones share the same backing storage.
#[derive(Debug, Clone)]
pub struct SensorRegistry {
    sensors: Arc<[Sensor]>,
}

impl SensorRegistry {
    /// Build a registry, rejecting empty lists, malformed and duplicate ids
    pub fn new(sensors: Vec<Sensor>) -> Result<Self> {
        if sensors.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut seen = HashSet::new();
        for sensor in &sensors {
            if !is_valid_sensor_id(&sensor.id) {
                return Err(RegistryError::InvalidId(sensor.id.clone()));
            }
            if !seen.insert(sensor.id.as_str()) {
                return Err(RegistryError::DuplicateSensor(sensor.id.clone()));
            }
        }

        Ok(Self {
            sensors: sensors.into(),
        })
    }

    pub fn get(&self, id: &str) -> Option<&Sensor> {
        self.sensors.iter().find(|s| s.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sensor> {
        self.sensors.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.sensors.iter().map(|s| s.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    /// Owned copy of the sensor list, in registry order
    pub fn to_vec(&self) -> Vec<Sensor> {
        self.sensors.to_vec()
    }
}

impl Default for SensorRegistry {
    fn default() -> Self {
        Self {
            sensors: default_sensors().into(),
        }
    }
}
