//! Broadcast channel
//!
//! A single memoryless topic carrying serialized readings from the publisher
//! to any number of subscribers. A subscriber only sees payloads emitted
//! while it is subscribed; history replay is the only way to recover the rest.

mod zenoh_channel;

pub use zenoh_channel::ZenohChannel;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use zenoh::handlers::FifoChannelHandler;
use zenoh::pubsub::Subscriber;
use zenoh::sample::Sample;

/// Buffered payloads per local subscriber before it starts lagging
pub const LOCAL_CHANNEL_CAPACITY: usize = 256;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Zenoh error: {0}")]
    Zenoh(#[from] zenoh::Error),
}

pub type Result<T> = std::result::Result<T, ChannelError>;

#[async_trait]
pub trait BroadcastChannel: Send + Sync {
    /// Emit one payload to whoever is subscribed right now
    async fn emit(&self, payload: Vec<u8>) -> Result<()>;

    /// Start receiving payloads emitted from now on
    async fn subscribe(&self) -> Result<Subscription>;
}

enum Inner {
    Local(broadcast::Receiver<Arc<[u8]>>),
    Zenoh(Subscriber<FifoChannelHandler<Sample>>),
}

/// Receiving end of a [`BroadcastChannel`]
pub struct Subscription {
    inner: Inner,
}

impl Subscription {
    /// Next raw payload, or `None` once the channel is gone
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        match &mut self.inner {
            Inner::Local(rx) => loop {
                match rx.recv().await {
                    Ok(payload) => return Some(payload.to_vec()),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("Subscriber lagged, {} payloads skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            },
            Inner::Zenoh(subscriber) => match subscriber.recv_async().await {
                Ok(sample) => Some(sample.payload().to_bytes().to_vec()),
                Err(e) => {
                    log::debug!("Zenoh subscription ended: {}", e);
                    None
                }
            },
        }
    }
}

/// In-process channel for single-process deployments and tests
#[derive(Clone)]
pub struct LocalChannel {
    tx: broadcast::Sender<Arc<[u8]>>,
}

impl LocalChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for LocalChannel {
    fn default() -> Self {
        Self::new(LOCAL_CHANNEL_CAPACITY)
    }
}

#[async_trait]
impl BroadcastChannel for LocalChannel {
    async fn emit(&self, payload: Vec<u8>) -> Result<()> {
        // No subscribers is not an error: the channel has no memory
        if self.tx.send(payload.into()).is_err() {
            log::debug!("Emitted with no subscribers");
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<Subscription> {
        Ok(Subscription {
            inner: Inner::Local(self.tx.subscribe()),
        })
    }
}
