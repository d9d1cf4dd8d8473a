//! Live-update events and the subscriber hub
//!
//! The hub owns the registry of connected subscribers. Each subscriber gets a
//! bounded channel; broadcasting never waits on a subscriber, and any
//! subscriber whose channel is closed or full is dropped from the registry so
//! one dead connection cannot hold up delivery to the rest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::EventWithImpacts;

/// Messages pushed to live subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SeismoEvent {
    /// Sent once when a subscriber connects
    Connection {
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A new earthquake finished processing (event plus impacts)
    NewEarthquake {
        data: EventWithImpacts,
        timestamp: DateTime<Utc>,
    },
}

impl SeismoEvent {
    /// Build a new-earthquake notification stamped with the current time
    pub fn new_earthquake(data: EventWithImpacts) -> Self {
        SeismoEvent::NewEarthquake {
            data,
            timestamp: Utc::now(),
        }
    }

    /// Welcome message for a freshly connected subscriber
    pub fn connection() -> Self {
        SeismoEvent::Connection {
            message: "Connected to seismic monitoring system".to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Event type string, used as the SSE `event:` name
    pub fn event_type(&self) -> &'static str {
        match self {
            SeismoEvent::Connection { .. } => "connection",
            SeismoEvent::NewEarthquake { .. } => "new_earthquake",
        }
    }
}

/// A registered subscriber's receiving end
pub struct Subscription {
    pub id: Uuid,
    pub receiver: mpsc::Receiver<SeismoEvent>,
}

/// Registry of live subscribers with lossy fan-out
///
/// Cheap to clone; clones share the same registry.
///
/// # Examples
///
/// ```
/// use seismo_common::events::{NotificationHub, SeismoEvent};
///
/// let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
/// rt.block_on(async {
///     let hub = NotificationHub::new(16);
///     let mut sub = hub.subscribe().await;
///
///     let delivered = hub.broadcast(SeismoEvent::connection()).await;
///     assert_eq!(delivered, 1);
///     assert!(sub.receiver.recv().await.is_some());
/// });
/// ```
#[derive(Clone)]
pub struct NotificationHub {
    subscribers: Arc<RwLock<HashMap<Uuid, mpsc::Sender<SeismoEvent>>>>,
    buffer: usize,
}

impl NotificationHub {
    /// Create a hub whose per-subscriber queues hold `buffer` messages
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            buffer: buffer.max(1),
        }
    }

    /// Register a new subscriber
    pub async fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = Uuid::new_v4();

        let mut subscribers = self.subscribers.write().await;
        subscribers.insert(id, tx);
        info!(subscriber = %id, total = subscribers.len(), "Subscriber connected");

        Subscription { id, receiver: rx }
    }

    /// Remove a subscriber (no-op if already gone)
    pub async fn unsubscribe(&self, id: Uuid) {
        let mut subscribers = self.subscribers.write().await;
        if subscribers.remove(&id).is_some() {
            info!(subscriber = %id, total = subscribers.len(), "Subscriber disconnected");
        }
    }

    /// Deliver an event to every live subscriber
    ///
    /// Returns the number of subscribers that accepted the event. Subscribers
    /// whose queue is closed or full are pruned.
    pub async fn broadcast(&self, event: SeismoEvent) -> usize {
        let mut subscribers = self.subscribers.write().await;
        let mut dropped = Vec::new();
        let mut delivered = 0;

        for (id, tx) in subscribers.iter() {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(subscriber = %id, error = %e, "Failed to deliver event, dropping subscriber");
                    dropped.push(*id);
                }
            }
        }

        for id in &dropped {
            subscribers.remove(id);
        }

        debug!(
            event_type = event.event_type(),
            delivered,
            dropped = dropped.len(),
            "Broadcast complete"
        );

        delivered
    }

    /// Number of currently registered subscribers
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(64)
    }
}
