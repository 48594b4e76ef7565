//! Broadcast relay
//!
//! Holds one subscription to the broadcast channel and fans every reading out
//! to the viewer sessions connected at that moment. Pushes never wait on a
//! viewer: each session has its own bounded queue, and a session that cannot
//! keep up only loses its own events.

use crate::channel::Subscription;
use crate::reading::Reading;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::sync::{mpsc, watch};

pub type SessionId = u64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Session {0} is lagging, event dropped")]
    Lagging(SessionId),

    #[error("Session {0} disconnected")]
    Disconnected(SessionId),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// A connected viewer as seen by the relay
pub trait ViewerSession: Send + Sync {
    fn id(&self) -> SessionId;

    /// Hand one reading to the session without blocking
    fn push(&self, reading: &Arc<Reading>) -> Result<(), DeliveryError>;
}

/// Session backed by a bounded queue drained by the session's transport task
pub struct ChannelSession {
    id: SessionId,
    tx: mpsc::Sender<Arc<Reading>>,
}

impl ChannelSession {
    pub fn new(id: SessionId, buffer: usize) -> (Self, mpsc::Receiver<Arc<Reading>>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { id, tx }, rx)
    }
}

impl ViewerSession for ChannelSession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn push(&self, reading: &Arc<Reading>) -> Result<(), DeliveryError> {
        self.tx.try_send(reading.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Lagging(self.id),
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Disconnected(self.id),
        })
    }
}

/// Result of fanning out one reading
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
    pub pruned: usize,
}

#[derive(Default)]
pub struct BroadcastRelay {
    sessions: RwLock<HashMap<SessionId, Arc<dyn ViewerSession>>>,
    next_id: AtomicU64,
}

impl BroadcastRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_session_id(&self) -> SessionId {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn register(&self, session: Arc<dyn ViewerSession>) {
        let id = session.id();
        let count = {
            let mut sessions = self
                .sessions
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            sessions.insert(id, session);
            sessions.len()
        };
        log::info!("Viewer session {} connected ({} connected)", id, count);
    }

    /// Register a fresh queue-backed session and return its receiving end
    pub fn open_session(&self, buffer: usize) -> (SessionId, mpsc::Receiver<Arc<Reading>>) {
        let id = self.next_session_id();
        let (session, rx) = ChannelSession::new(id, buffer);
        self.register(Arc::new(session));
        (id, rx)
    }

    pub fn unregister(&self, id: SessionId) -> bool {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&id)
            .is_some();
        if removed {
            log::info!("Viewer session {} disconnected", id);
        }
        removed
    }

    pub fn session_count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Push `reading` to every session registered right now.
    ///
    /// Sessions joining while the push is in progress do not get this event.
    pub fn dispatch(&self, reading: Arc<Reading>) -> DispatchReport {
        let snapshot: Vec<Arc<dyn ViewerSession>> = self
            .sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect();

        let mut report = DispatchReport::default();
        let mut gone = Vec::new();

        for session in snapshot {
            match session.push(&reading) {
                Ok(()) => report.delivered += 1,
                Err(DeliveryError::Disconnected(id)) => {
                    report.failed += 1;
                    gone.push(id);
                }
                Err(e) => {
                    report.failed += 1;
                    log::debug!("Delivery to session {} failed: {}", session.id(), e);
                }
            }
        }

        for id in gone {
            if self.unregister(id) {
                report.pruned += 1;
            }
        }

        report
    }

    /// Decode one channel payload and dispatch it; malformed payloads are dropped
    pub fn handle_payload(&self, payload: &[u8]) -> Option<DispatchReport> {
        match Reading::from_json_bytes(payload) {
            Ok(reading) => {
                log::debug!(
                    "Relaying {} {}{} to {} sessions",
                    reading.city,
                    reading.temperature,
                    crate::reading::units::TEMPERATURE,
                    self.session_count()
                );
                Some(self.dispatch(Arc::new(reading)))
            }
            Err(e) => {
                log::warn!("Dropping malformed broadcast payload: {}", e);
                None
            }
        }
    }

    /// Relay everything from `subscription` until shutdown or channel close
    pub async fn run(
        self: Arc<Self>,
        mut subscription: Subscription,
        mut shutdown: watch::Receiver<()>,
    ) {
        log::info!("Broadcast relay started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    log::info!("Broadcast relay shutting down...");
                    break;
                }

                payload = subscription.recv() => {
                    match payload {
                        Some(payload) => {
                            self.handle_payload(&payload);
                        }
                        None => {
                            log::warn!("Broadcast channel closed, relay stopping");
                            break;
                        }
                    }
                }
            }
        }
    }
}
