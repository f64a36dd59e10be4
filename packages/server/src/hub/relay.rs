//! Persistence relay: stores delivered messages and triggers push
//! notifications off the broadcast path.
//!
//! Producers enqueue onto a bounded queue drained in FIFO order by a single
//! worker. Storage and notification failures are logged and never reach the
//! sender. Delivery to storage is at-most-once.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::{
    config::OverflowPolicy,
    domain::{ChatMessage, MessageStore, NotificationSender},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("persistence queue is full, message dropped")]
    QueueFull,

    #[error("persistence relay is not running")]
    Stopped,
}

/// Queue depth and drop counter of the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub depth: usize,
    pub capacity: usize,
    pub dropped: u64,
}

/// Producer side of the relay queue.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    queue: mpsc::Sender<Arc<ChatMessage>>,
    capacity: usize,
    policy: OverflowPolicy,
    dropped: Arc<AtomicU64>,
    /// Set while the depth is at or above the high watermark.
    above_watermark: Arc<AtomicBool>,
}

impl RelayHandle {
    pub async fn enqueue(&self, message: Arc<ChatMessage>) -> Result<(), RelayError> {
        let result = match self.policy {
            OverflowPolicy::Block => self
                .queue
                .send(message)
                .await
                .map_err(|_| RelayError::Stopped),
            OverflowPolicy::Drop => self.queue.try_send(message).map_err(|e| match e {
                TrySendError::Full(_) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    RelayError::QueueFull
                }
                TrySendError::Closed(_) => RelayError::Stopped,
            }),
        };

        self.watch_depth();
        result
    }

    /// Messages waiting for the worker.
    pub fn depth(&self) -> usize {
        self.capacity - self.queue.capacity()
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            depth: self.depth(),
            capacity: self.capacity,
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    fn high_watermark(&self) -> usize {
        (self.capacity * 3 / 4).max(1)
    }

    /// Warn once each time the depth climbs to the high watermark or past it.
    /// Returns whether this call warned.
    fn watch_depth(&self) -> bool {
        let depth = self.depth();
        if depth < self.high_watermark() {
            self.above_watermark.store(false, Ordering::Relaxed);
            return false;
        }
        if self.above_watermark.swap(true, Ordering::Relaxed) {
            return false;
        }
        tracing::warn!(
            depth,
            capacity = self.capacity,
            "persistence queue is filling up"
        );
        true
    }
}

pub struct PersistenceRelay {
    store: Arc<dyn MessageStore>,
    notifier: Arc<dyn NotificationSender>,
}

impl PersistenceRelay {
    /// Start the worker. It drains the queue and exits once every
    /// [`RelayHandle`] has been dropped.
    pub fn spawn(
        store: Arc<dyn MessageStore>,
        notifier: Arc<dyn NotificationSender>,
        capacity: usize,
        policy: OverflowPolicy,
    ) -> RelayHandle {
        let capacity = capacity.max(1);
        let (queue, receiver) = mpsc::channel(capacity);
        tokio::spawn(Self { store, notifier }.run(receiver));

        RelayHandle {
            queue,
            capacity,
            policy,
            dropped: Arc::new(AtomicU64::new(0)),
            above_watermark: Arc::new(AtomicBool::new(false)),
        }
    }

    async fn run(self, mut queue: mpsc::Receiver<Arc<ChatMessage>>) {
        while let Some(message) = queue.recv().await {
            self.process(&message).await;
        }
        tracing::info!("persistence relay stopped");
    }

    async fn process(&self, message: &ChatMessage) {
        if let Err(e) = self.store.insert(message).await {
            tracing::error!(
                message_id = ?message.id,
                room_id = ?message.room_id,
                error = %e,
                "failed to store message"
            );
        }

        let Some(receiver) = &message.receiver_id else {
            tracing::debug!(message_id = ?message.id, "no receiver, notification skipped");
            return;
        };

        let (data, notification) = message.notification_payload();
        if let Err(e) = self
            .notifier
            .send_notification(receiver, data, notification)
            .await
        {
            tracing::warn!(receiver = %receiver, error = %e, "failed to send notification");
        }
    }
}
