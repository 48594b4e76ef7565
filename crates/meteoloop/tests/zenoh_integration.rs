//! Integration tests for the split publish/serve deployment over Zenoh
//!
//! ## Running Tests
//!
//! These tests are marked with `#[ignore]` because they require `zenohd` in PATH.
//!
//! ```bash
//! cargo test --test zenoh_integration -- --ignored --test-threads=1
//! ```

mod common;

use common::{init_logging, reading, setup_test_session, wait_for, ZenohdHandle};
use meteoloop::channel::{BroadcastChannel, ZenohChannel};
use meteoloop::history::{HistoryReader, HistoryWriter, MemoryHistory};
use meteoloop::history_api::{HistoryQueryable, ZenohHistoryClient};
use meteoloop::{BroadcastRelay, ChannelPublisher, Reading, SensorRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const TEST_KEY: &str = "meteoloop/test/weather-updates";

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore] // Requires zenohd
async fn test_broadcast_reaches_remote_relay() {
    init_logging();
    let _router = ZenohdHandle::start().expect("zenohd in PATH");

    let publisher_session = setup_test_session().await.unwrap();
    let server_session = setup_test_session().await.unwrap();

    // Server side
    let relay = Arc::new(BroadcastRelay::new());
    let subscription = ZenohChannel::new(server_session, TEST_KEY)
        .subscribe()
        .await
        .unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let relay_task = tokio::spawn(relay.clone().run(subscription, shutdown_rx));
    let (_id, mut rx) = relay.open_session(16);

    // Give Zenoh time to propagate the subscription
    tokio::time::sleep(Duration::from_millis(500)).await;

    // Publisher side
    let history = Arc::new(MemoryHistory::new(&SensorRegistry::default(), 10));
    let channel = Arc::new(ZenohChannel::new(publisher_session, TEST_KEY));
    let publisher = ChannelPublisher::new(history.clone(), channel);

    let sent = reading("sensor-2", 0, 11.0);
    let outcome = publisher.publish(sent.clone()).await;
    assert!(outcome.persisted && outcome.broadcast);

    let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event within timeout")
        .unwrap();
    assert_eq!(received.as_ref(), &sent);

    shutdown_tx.send(()).unwrap();
    relay_task.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore] // Requires zenohd
async fn test_history_served_over_queryable() {
    init_logging();
    let _router = ZenohdHandle::start().expect("zenohd in PATH");

    let owner = setup_test_session().await.unwrap();
    let reader_session = setup_test_session().await.unwrap();

    let history = Arc::new(MemoryHistory::new(&SensorRegistry::default(), 10));
    for i in 0..3 {
        history
            .append("sensor-3", reading("sensor-3", i, i as f64))
            .unwrap();
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let queryable = HistoryQueryable::new(owner, history.clone());
    let queryable_task = tokio::spawn(async move { queryable.run(shutdown_rx).await });

    let client = ZenohHistoryClient::new(reader_session, Duration::from_secs(2));

    // Retry until the queryable is visible to the reader
    let found: Arc<std::sync::Mutex<Vec<Reading>>> = Arc::default();
    wait_for(5, || {
        let found = found.clone();
        let client = &client;
        async move {
            match client.read("sensor-3").await {
                Ok(readings) => {
                    *found.lock().unwrap() = readings;
                    true
                }
                Err(_) => false,
            }
        }
    })
    .await
    .expect("history reachable");

    assert_eq!(*found.lock().unwrap(), history.snapshot("sensor-3"));
    assert!(client.read("sensor-404").await.unwrap().is_empty());
    assert!(client.read("bad/id").await.unwrap().is_empty());

    shutdown_tx.send(()).unwrap();
    queryable_task.await.unwrap().unwrap();
}
