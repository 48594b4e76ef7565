//! Meteoloop
//!
//! Periodic weather readings for a fixed set of sensors, fanned out live to
//! any number of viewers, with a bounded per-sensor history for late joiners.
//!
//! Data flow:
//!
//! ```text
//! Acquirer -> ChannelPublisher -> (HistoryWriter, BroadcastChannel)
//!                                          |              |
//!                               HistoryReader       BroadcastRelay -> viewer sessions
//!                                          \______________/
//!                                           ClientAggregator (per viewer)
//! ```

pub mod acquire;
pub mod aggregator;
pub mod channel;
pub mod combiner;
pub mod config;
pub mod history;
pub mod history_api;
pub mod http_server;
pub mod pipeline;
pub mod publisher;
pub mod reading;
pub mod registry;
pub mod relay;
pub mod viewer;
pub mod zenoh_session;

pub use acquire::Acquirer;
pub use aggregator::{ClientAggregator, Series};
pub use channel::{BroadcastChannel, LocalChannel, ZenohChannel};
pub use config::Config;
pub use history::{HistoryReader, HistoryWriter, MemoryHistory};
pub use history_api::{HistoryQueryable, ZenohHistoryClient};
pub use http_server::{run_http_server, AppState};
pub use pipeline::run_acquisition;
pub use publisher::ChannelPublisher;
pub use reading::{LiveEvent, Reading};
pub use registry::{Sensor, SensorRegistry};
pub use relay::BroadcastRelay;
pub use viewer::ViewerClient;
pub use zenoh_session::open_session;
