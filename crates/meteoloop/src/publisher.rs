//! Channel publisher
//!
//! The only writer of the history store. Each reading is appended to history
//! and then emitted on the broadcast channel, as one unit per reading.

use crate::channel::BroadcastChannel;
use crate::history::HistoryWriter;
use crate::reading::Reading;
use std::sync::Arc;

/// What happened to one published reading
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    pub persisted: bool,
    pub broadcast: bool,
}

pub struct ChannelPublisher {
    history: Arc<dyn HistoryWriter>,
    channel: Arc<dyn BroadcastChannel>,
}

impl ChannelPublisher {
    pub fn new(history: Arc<dyn HistoryWriter>, channel: Arc<dyn BroadcastChannel>) -> Self {
        Self { history, channel }
    }

    /// Append `reading` to history, then broadcast it.
    ///
    /// A history failure drops the reading from history for good but it is
    /// still broadcast live. Nothing here is retried.
    pub async fn publish(&self, reading: Reading) -> PublishOutcome {
        let mut outcome = PublishOutcome::default();

        let payload = match reading.to_json_bytes() {
            Ok(payload) => payload,
            Err(e) => {
                log::error!("Failed to encode reading for {}: {}", reading.sensor_id, e);
                return outcome;
            }
        };

        match self.history.append(&reading.sensor_id, reading.clone()) {
            Ok(()) => outcome.persisted = true,
            Err(e) => log::error!(
                "History append failed for {} ({}), reading not retained: {}",
                reading.city,
                reading.sensor_id,
                e
            ),
        }

        match self.channel.emit(payload).await {
            Ok(()) => outcome.broadcast = true,
            Err(e) => log::warn!(
                "Broadcast failed for {} ({}): {}",
                reading.city,
                reading.sensor_id,
                e
            ),
        }

        if outcome.broadcast {
            log::info!(
                "Published {}: {}{}",
                reading.city,
                reading.temperature,
                crate::reading::units::TEMPERATURE
            );
        }

        outcome
    }
}
