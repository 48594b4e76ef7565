//! Periodic fetch-then-publish loop

use crate::acquire::Acquirer;
use crate::publisher::ChannelPublisher;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Counters for one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub sensors: usize,
    pub produced: usize,
    pub persisted: usize,
    pub broadcast: usize,
}

/// Run one acquisition tick and publish its readings.
///
/// All sensors are fetched concurrently; publishing starts once every fetch
/// has settled and proceeds sequentially, so one sensor's readings always
/// leave in tick order.
pub async fn run_tick(acquirer: &Acquirer, publisher: &ChannelPublisher) -> TickSummary {
    let readings = acquirer.tick().await;
    let mut summary = TickSummary {
        sensors: acquirer.registry().len(),
        produced: readings.len(),
        ..Default::default()
    };

    for reading in readings {
        let outcome = publisher.publish(reading).await;
        summary.persisted += outcome.persisted as usize;
        summary.broadcast += outcome.broadcast as usize;
    }

    summary
}

/// Tick immediately, then every `interval`, until shutdown
pub async fn run_acquisition(
    acquirer: &Acquirer,
    publisher: &ChannelPublisher,
    interval: Duration,
    mut shutdown: watch::Receiver<()>,
) {
    let mut timer = tokio::time::interval(interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    log::info!(
        "Acquisition started: {} sensors every {:?}",
        acquirer.registry().len(),
        interval
    );

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                log::info!("Acquisition shutting down...");
                break;
            }

            _ = timer.tick() => {
                let summary = run_tick(acquirer, publisher).await;
                log::debug!("Tick complete: {:?}", summary);
                if summary.produced < summary.sensors {
                    log::info!(
                        "Tick produced {}/{} readings",
                        summary.produced,
                        summary.sensors
                    );
                }
            }
        }
    }
}
