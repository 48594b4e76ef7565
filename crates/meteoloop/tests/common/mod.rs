//! Shared helpers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use meteoloop::acquire::{self, FetchError, PrimaryPayload, SecondaryPayload, UpstreamSource};
use meteoloop::reading::Reading;
use meteoloop::registry::Sensor;
use std::collections::HashMap;
use std::process::{Child, Command};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::time::timeout;
use zenoh::Session;

/// Router endpoint used by the ignored Zenoh tests
pub const TEST_ROUTER_ENDPOINT: &str = "tcp/127.0.0.1:17447";

static LOGGER: Once = Once::new();

/// Route `log` output through the test harness; `RUST_LOG` still applies
pub fn init_logging() {
    LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// How a scripted source answers for one sensor
#[derive(Debug, Clone)]
pub enum Outcome<P> {
    Ok(P),
    /// Non-2xx upstream status
    Status(u16),
    /// Never answers; the acquirer's deadline turns this into a timeout
    Hang,
}

/// Upstream source with a fixed answer per sensor id
pub struct Scripted<P> {
    name: &'static str,
    default: Outcome<P>,
    overrides: HashMap<String, Outcome<P>>,
    calls: AtomicUsize,
}

impl<P: Clone> Scripted<P> {
    pub fn new(name: &'static str, default: Outcome<P>) -> Self {
        Self {
            name,
            default,
            overrides: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, sensor_id: &str, outcome: Outcome<P>) -> Self {
        self.overrides.insert(sensor_id.to_string(), outcome);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<P: Clone + Send + Sync + 'static> UpstreamSource for Scripted<P> {
    type Payload = P;

    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch(&self, sensor: &Sensor) -> acquire::Result<P> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self.overrides.get(&sensor.id).unwrap_or(&self.default).clone();
        match outcome {
            Outcome::Ok(payload) => Ok(payload),
            Outcome::Status(code) => Err(FetchError::Status(code)),
            Outcome::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(FetchError::Status(504))
            }
        }
    }
}

pub fn primary(temperature: f64, humidity: f64, pressure: f64, wind_speed: f64) -> PrimaryPayload {
    PrimaryPayload {
        temperature,
        humidity,
        pressure,
        wind_speed,
    }
}

pub fn secondary(condition: &str, temperature: f64) -> SecondaryPayload {
    SecondaryPayload {
        city: Some("Somewhere".to_string()),
        temperature,
        humidity: 50.0,
        pressure: 1010.0,
        condition: condition.to_string(),
    }
}

pub type ScriptedPrimary = Scripted<PrimaryPayload>;
pub type ScriptedSecondary = Scripted<SecondaryPayload>;

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}

/// Handle to a running zenohd process for testing
pub struct ZenohdHandle {
    child: Option<Child>,
}

impl ZenohdHandle {
    /// Start a zenohd router for testing
    ///
    /// Note: This requires `zenohd` to be in PATH.
    pub fn start() -> Result<Self, std::io::Error> {
        let child = Command::new("zenohd")
            .arg("--no-multicast-scouting")
            .arg("--listen")
            .arg(TEST_ROUTER_ENDPOINT)
            .spawn()?;

        // Give zenohd time to start up
        std::thread::sleep(Duration::from_millis(500));

        Ok(Self { child: Some(child) })
    }

    pub fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Drop for ZenohdHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Session connected to the test router
pub async fn setup_test_session() -> Result<Arc<Session>, zenoh::Error> {
    let mut zenoh_config = zenoh::Config::default();
    zenoh_config.insert_json5("mode", "\"peer\"").ok();
    zenoh_config
        .insert_json5(
            "connect/endpoints",
            &format!("[\"{}\"]", TEST_ROUTER_ENDPOINT),
        )
        .ok();
    zenoh_config
        .insert_json5("scouting/multicast/enabled", "false")
        .ok();

    let session = zenoh::open(zenoh_config).await?;
    Ok(Arc::new(session))
}

/// Wait for a condition with timeout
pub async fn wait_for<F, Fut>(
    timeout_secs: u64,
    mut condition: F,
) -> Result<(), Box<dyn std::error::Error>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let result = timeout(Duration::from_secs(timeout_secs), async {
        loop {
            if condition().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;

    match result {
        Ok(()) => Ok(()),
        Err(_) => Err("Timeout waiting for condition".into()),
    }
}

/// Reading for `sensor_id` at a fixed base time plus `secs`
pub fn reading(sensor_id: &str, secs: i64, temperature: f64) -> Reading {
    Reading {
        sensor_id: sensor_id.to_string(),
        city: "Test City".to_string(),
        latitude: 0.0,
        longitude: 0.0,
        temperature,
        humidity: 40.0,
        pressure: 1013.0,
        wind_speed: 3.0,
        timestamp: Utc
            .timestamp_opt(1_700_000_000 + secs, 0)
            .single()
            .expect("valid timestamp"),
        enrichment: None,
    }
}
