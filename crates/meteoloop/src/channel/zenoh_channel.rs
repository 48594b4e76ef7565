//! Zenoh-backed broadcast channel for multi-process deployments

use super::{BroadcastChannel, Inner, Result, Subscription};
use async_trait::async_trait;
use std::sync::Arc;
use zenoh::bytes::ZBytes;
use zenoh::Session;

/// Publishes and subscribes on a single key expression
pub struct ZenohChannel {
    session: Arc<Session>,
    key: String,
}

impl ZenohChannel {
    pub fn new(session: Arc<Session>, key: impl Into<String>) -> Self {
        Self {
            session,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl BroadcastChannel for ZenohChannel {
    async fn emit(&self, payload: Vec<u8>) -> Result<()> {
        self.session.put(self.key.as_str(), ZBytes::from(payload)).await?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<Subscription> {
        let subscriber = self.session.declare_subscriber(self.key.clone()).await?;
        log::info!("Subscribed to {}", self.key);
        Ok(Subscription {
            inner: Inner::Zenoh(subscriber),
        })
    }
}
