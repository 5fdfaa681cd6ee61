// src/dispatch/notification.rs

//! Broadcast side of event delivery.

use std::fmt::Debug;
use std::path::PathBuf;

use tokio::sync::broadcast;
use tracing::trace;

use crate::engine::QueueId;
use crate::types::QueueEvent;

/// Payload published for every broadcast delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub event: QueueEvent,
    /// The queue instance that observed the change.
    pub source: QueueId,
    pub path: PathBuf,
}

impl Notification {
    pub fn topic(&self) -> &'static str {
        self.event.topic()
    }
}

/// External publish/subscribe transport.
///
/// The queue only ever calls `publish`; fan-out to listeners is the sink's
/// business.
pub trait NotificationSink: Send + Sync + Debug {
    fn publish(&self, topic: &'static str, notification: Notification);
}

/// In-process sink backed by a `tokio::sync::broadcast` channel.
///
/// One center can be shared by several queues; subscribers tell them apart
/// by [`Notification::source`].
#[derive(Debug, Clone)]
pub struct NotificationCenter {
    tx: broadcast::Sender<Notification>,
}

pub const DEFAULT_BROADCAST_CAPACITY: usize = 256;

impl NotificationCenter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new(DEFAULT_BROADCAST_CAPACITY)
    }
}

impl NotificationSink for NotificationCenter {
    fn publish(&self, topic: &'static str, notification: Notification) {
        if self.tx.send(notification).is_err() {
            trace!(topic, "no subscribers; notification dropped");
        }
    }
}
