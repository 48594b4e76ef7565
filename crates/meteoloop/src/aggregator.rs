//! Client-side aggregation
//!
//! One [`ClientAggregator`] per viewer keeps a bounded sliding window of
//! display points per sensor. Windows are seeded from history on connect and
//! then advanced by live readings. The x-axis is assignment order, not wall
//! clock time, so missed ticks do not show up as gaps.

use crate::reading::Reading;
use crate::registry::SensorRegistry;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};

/// One plotted point derived from one reading
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayPoint {
    /// Monotonically increasing x value within a window
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub wind_speed: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Empty,
    Populated,
}

/// FIFO window with a strict length cap
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    points: VecDeque<DisplayPoint>,
    capacity: usize,
    next_index: u64,
    /// Timestamps of the history the window was last seeded from
    seeded: HashSet<DateTime<Utc>>,
}

impl SlidingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            points: VecDeque::new(),
            capacity,
            next_index: 0,
            seeded: HashSet::new(),
        }
    }

    /// Append a point for `reading`, evicting the oldest beyond capacity.
    ///
    /// Returns `false` without changing anything when a reading with the same
    /// timestamp is already in the window or came with the last seed.
    pub fn push(&mut self, reading: &Reading) -> bool {
        if self.contains(reading.timestamp) {
            return false;
        }
        self.push_point(reading);
        true
    }

    /// Replace the contents with the newest `capacity` entries of `history`
    pub fn seed(&mut self, history: &[Reading]) {
        self.points.clear();
        self.seeded = history.iter().map(|r| r.timestamp).collect();
        let skip = history.len().saturating_sub(self.capacity);
        for reading in &history[skip..] {
            self.push_point(reading);
        }
    }

    fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.seeded.contains(&timestamp) || self.points.iter().any(|p| p.timestamp == timestamp)
    }

    fn push_point(&mut self, reading: &Reading) {
        let point = DisplayPoint {
            index: self.next_index,
            timestamp: reading.timestamp,
            temperature: reading.temperature,
            humidity: reading.humidity,
            pressure: reading.pressure,
            wind_speed: reading.wind_speed,
        };
        self.next_index += 1;

        self.points.push_back(point);
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn state(&self) -> WindowState {
        if self.points.is_empty() {
            WindowState::Empty
        } else {
            WindowState::Populated
        }
    }

    pub fn points(&self) -> impl Iterator<Item = &DisplayPoint> {
        self.points.iter()
    }
}

/// Presentation-ready series for one sensor, oldest point first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub sensor_id: String,
    pub city: String,
    pub points: Vec<DisplayPoint>,
}

impl Series {
    pub fn temperature(&self) -> Vec<(u64, f64)> {
        self.project(|p| p.temperature)
    }

    pub fn humidity(&self) -> Vec<(u64, f64)> {
        self.project(|p| p.humidity)
    }

    pub fn pressure(&self) -> Vec<(u64, f64)> {
        self.project(|p| p.pressure)
    }

    pub fn latest(&self) -> Option<&DisplayPoint> {
        self.points.last()
    }

    fn project(&self, metric: impl Fn(&DisplayPoint) -> f64) -> Vec<(u64, f64)> {
        self.points.iter().map(|p| (p.index, metric(p))).collect()
    }
}

/// Temperature classes for heat-map style colouring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureBand {
    Cold,
    Cool,
    Mild,
    Hot,
}

impl TemperatureBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemperatureBand::Cold => "cold",
            TemperatureBand::Cool => "cool",
            TemperatureBand::Mild => "mild",
            TemperatureBand::Hot => "hot",
        }
    }
}

pub fn temperature_band(celsius: f64) -> TemperatureBand {
    if celsius > 30.0 {
        TemperatureBand::Hot
    } else if celsius > 20.0 {
        TemperatureBand::Mild
    } else if celsius > 10.0 {
        TemperatureBand::Cool
    } else {
        TemperatureBand::Cold
    }
}

/// Per-viewer set of sliding windows
pub struct ClientAggregator {
    capacity: usize,
    windows: HashMap<String, SlidingWindow>,
    cities: HashMap<String, String>,
}

impl ClientAggregator {
    pub fn new(registry: &SensorRegistry, capacity: usize) -> Self {
        let windows = registry
            .ids()
            .map(|id| (id.to_string(), SlidingWindow::new(capacity)))
            .collect();
        let cities = registry
            .iter()
            .map(|s| (s.id.clone(), s.city.clone()))
            .collect();
        Self {
            capacity,
            windows,
            cities,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Seed one sensor's window from its history (oldest-first)
    pub fn seed(&mut self, sensor_id: &str, history: &[Reading]) -> Series {
        if let Some(last) = history.last() {
            self.cities.insert(sensor_id.to_string(), last.city.clone());
        }
        self.window_mut(sensor_id).seed(history);
        self.build_series(sensor_id)
    }

    /// Advance the window for a live reading.
    ///
    /// Returns the updated series, or `None` when the reading was already
    /// covered (e.g. it arrived both through history and live).
    pub fn apply(&mut self, reading: &Reading) -> Option<Series> {
        if !self.window_mut(&reading.sensor_id).push(reading) {
            log::debug!(
                "Skipping already-seen reading for {} at {}",
                reading.sensor_id,
                reading.timestamp
            );
            return None;
        }
        self.cities
            .entry(reading.sensor_id.clone())
            .or_insert_with(|| reading.city.clone());
        Some(self.build_series(&reading.sensor_id))
    }

    pub fn series(&self, sensor_id: &str) -> Option<Series> {
        self.windows
            .contains_key(sensor_id)
            .then(|| self.build_series(sensor_id))
    }

    pub fn state(&self, sensor_id: &str) -> WindowState {
        self.windows
            .get(sensor_id)
            .map(SlidingWindow::state)
            .unwrap_or(WindowState::Empty)
    }

    pub fn window(&self, sensor_id: &str) -> Option<&SlidingWindow> {
        self.windows.get(sensor_id)
    }

    fn window_mut(&mut self, sensor_id: &str) -> &mut SlidingWindow {
        let capacity = self.capacity;
        self.windows
            .entry(sensor_id.to_string())
            .or_insert_with(|| SlidingWindow::new(capacity))
    }

    fn build_series(&self, sensor_id: &str) -> Series {
        Series {
            sensor_id: sensor_id.to_string(),
            city: self.cities.get(sensor_id).cloned().unwrap_or_default(),
            points: self
                .windows
                .get(sensor_id)
                .map(|w| w.points().cloned().collect())
                .unwrap_or_default(),
        }
    }
}
