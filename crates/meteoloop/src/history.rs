//! Bounded per-sensor history
//!
//! Each sensor owns an independent log capped at `capacity` readings; the
//! oldest entry is evicted when a new one would exceed the cap. Readers get
//! owned snapshots, never a handle into the log.

use crate::reading::Reading;
use crate::registry::SensorRegistry;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("History store unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown sensor: {0}")]
    UnknownSensor(String),

    #[error("History query failed: {0}")]
    Query(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HistoryError>;

/// Write side of the history, used only by the channel publisher
pub trait HistoryWriter: Send + Sync {
    fn append(&self, sensor_id: &str, reading: Reading) -> Result<()>;
}

/// Read side of the history, used to seed newly connected viewers
#[async_trait]
pub trait HistoryReader: Send + Sync {
    /// Oldest-first snapshot. Unknown sensors yield an empty list.
    async fn read(&self, sensor_id: &str) -> Result<Vec<Reading>>;
}

/// In-process ring-buffer history.
///
/// The sensor map is fixed at construction, so appends and reads only ever
/// contend on the lock of the sensor they touch.
pub struct MemoryHistory {
    capacity: usize,
    logs: HashMap<String, Mutex<VecDeque<Reading>>>,
}

impl MemoryHistory {
    /// A capacity of zero keeps nothing: appends succeed and reads are empty.
    pub fn new(registry: &SensorRegistry, capacity: usize) -> Self {
        let logs = registry
            .ids()
            .map(|id| (id.to_string(), Mutex::new(VecDeque::new())))
            .collect();
        Self { capacity, logs }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Synchronous oldest-first copy of one sensor's log
    pub fn snapshot(&self, sensor_id: &str) -> Vec<Reading> {
        match self.logs.get(sensor_id) {
            Some(log) => {
                let guard = log.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                guard.iter().cloned().collect()
            }
            None => Vec::new(),
        }
    }

    pub fn len(&self, sensor_id: &str) -> usize {
        self.logs
            .get(sensor_id)
            .map(|log| {
                log.lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .len()
            })
            .unwrap_or(0)
    }
}

impl HistoryWriter for MemoryHistory {
    fn append(&self, sensor_id: &str, reading: Reading) -> Result<()> {
        let log = self
            .logs
            .get(sensor_id)
            .ok_or_else(|| HistoryError::UnknownSensor(sensor_id.to_string()))?;

        if self.capacity == 0 {
            return Ok(());
        }

        let mut guard = log
            .lock()
            .map_err(|_| HistoryError::Unavailable(format!("log for {} is poisoned", sensor_id)))?;
        while guard.len() >= self.capacity {
            guard.pop_front();
        }
        guard.push_back(reading);
        Ok(())
    }
}

#[async_trait]
impl HistoryReader for MemoryHistory {
    async fn read(&self, sensor_id: &str) -> Result<Vec<Reading>> {
        Ok(self.snapshot(sensor_id))
    }
}
