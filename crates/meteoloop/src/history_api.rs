//! History query interface over Zenoh
//!
//! The publisher process owns the history store and answers queries for it;
//! server processes read it remotely to seed new viewers.
//!
//! | Key Expression | Reply |
//! |----------------|-------|
//! | `meteoloop/sensor/{id}/readings` | JSON array of readings, oldest-first |

use crate::history::{HistoryError, HistoryReader, Result};
use crate::reading::Reading;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use zenoh::bytes::ZBytes;
use zenoh::Session;

/// Key expressions for history queries
pub mod keys {
    pub const READINGS_PREFIX: &str = "meteoloop/sensor/";
    pub const READINGS_SUFFIX: &str = "/readings";

    /// Matches every sensor's history key
    pub const READINGS_WILDCARD: &str = "meteoloop/sensor/*/readings";

    pub fn readings_key(sensor_id: &str) -> String {
        format!("{}{}{}", READINGS_PREFIX, sensor_id, READINGS_SUFFIX)
    }

    /// Extract the sensor id from a concrete history key
    pub fn sensor_from_key(key: &str) -> Option<&str> {
        key.strip_prefix(READINGS_PREFIX)?
            .strip_suffix(READINGS_SUFFIX)
            .filter(|id| !id.is_empty() && !id.contains('/'))
    }

    pub use crate::registry::is_valid_sensor_id;
}

/// Answers history queries from a local store
pub struct HistoryQueryable {
    session: Arc<Session>,
    history: Arc<dyn HistoryReader>,
}

impl HistoryQueryable {
    pub fn new(session: Arc<Session>, history: Arc<dyn HistoryReader>) -> Self {
        Self { session, history }
    }

    pub async fn run(
        self,
        mut shutdown: watch::Receiver<()>,
    ) -> std::result::Result<(), zenoh::Error> {
        let queryable = self
            .session
            .declare_queryable(keys::READINGS_WILDCARD)
            .await?;

        log::info!("Declared queryable on {}", keys::READINGS_WILDCARD);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    log::info!("History queryable shutting down...");
                    break;
                }

                query = queryable.recv_async() => {
                    match query {
                        Ok(query) => self.handle_query(&query).await,
                        Err(e) => {
                            log::warn!("Query receive error: {}", e);
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    async fn handle_query(&self, query: &zenoh::query::Query) {
        let key_expr = query.key_expr().as_str();
        log::debug!("History query received on: {}", key_expr);

        let readings = match keys::sensor_from_key(key_expr) {
            Some(sensor_id) => self.history.read(sensor_id).await,
            None => Ok(Vec::new()),
        };

        let reply = readings.and_then(|r| serde_json::to_string(&r).map_err(HistoryError::from));
        let sent = match reply {
            Ok(json) => query.reply(query.key_expr(), ZBytes::from(json)).await,
            Err(e) => {
                log::error!("History read failed for {}: {}", key_expr, e);
                query.reply_err(ZBytes::from(e.to_string())).await
            }
        };

        if let Err(e) = sent {
            log::error!("Failed to send reply for {}: {}", key_expr, e);
        }
    }
}

/// Reads history held by a remote [`HistoryQueryable`]
pub struct ZenohHistoryClient {
    session: Arc<Session>,
    timeout: Duration,
}

impl ZenohHistoryClient {
    pub fn new(session: Arc<Session>, timeout: Duration) -> Self {
        Self { session, timeout }
    }
}

#[async_trait]
impl HistoryReader for ZenohHistoryClient {
    async fn read(&self, sensor_id: &str) -> Result<Vec<Reading>> {
        if !keys::is_valid_sensor_id(sensor_id) {
            return Ok(Vec::new());
        }

        let key = keys::readings_key(sensor_id);
        let replies = self
            .session
            .get(key.as_str())
            .timeout(self.timeout)
            .await
            .map_err(|e| HistoryError::Query(e.to_string()))?;

        let mut failure = None;
        while let Ok(reply) = replies.recv_async().await {
            match reply.result() {
                Ok(sample) => {
                    let bytes = sample.payload().to_bytes();
                    return Ok(serde_json::from_slice(&bytes)?);
                }
                Err(err) => {
                    let message = String::from_utf8_lossy(&err.payload().to_bytes()).to_string();
                    log::warn!("Error reply for {}: {}", key, message);
                    failure = Some(message);
                }
            }
        }

        match failure {
            Some(message) => Err(HistoryError::Unavailable(message)),
            None => Err(HistoryError::Query(format!("No reply received for {}", key))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::keys::*;

    #[test]
    fn test_readings_key_round_trip() {
        let key = readings_key("sensor-3");
        assert_eq!(key, "meteoloop/sensor/sensor-3/readings");
        assert_eq!(sensor_from_key(&key), Some("sensor-3"));
    }

    #[test]
    fn test_foreign_keys_rejected() {
        assert_eq!(sensor_from_key("meteoloop/weather-updates"), None);
        assert_eq!(sensor_from_key("meteoloop/sensor//readings"), None);
        assert_eq!(sensor_from_key("meteoloop/sensor/a/b/readings"), None);
    }

    #[test]
    fn test_sensor_id_validation() {
        assert!(is_valid_sensor_id("sensor-1"));
        assert!(!is_valid_sensor_id(""));
        assert!(!is_valid_sensor_id("**"));
        assert!(!is_valid_sensor_id("a/b"));
    }
}
