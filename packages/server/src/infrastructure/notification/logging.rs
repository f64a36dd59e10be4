//! Notification sender that logs pushes instead of calling a push provider.
//!
//! Every notification is also kept in an outbox so local runs and tests can
//! see what would have been sent.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{Notification, NotificationData, NotificationError, NotificationSender, UserId};

/// A notification that went through [`LoggingNotificationSender`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub receiver: UserId,
    pub data: NotificationData,
    pub notification: Notification,
}

#[derive(Debug, Default)]
pub struct LoggingNotificationSender {
    outbox: Mutex<Vec<SentNotification>>,
}

impl LoggingNotificationSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn outbox(&self) -> Vec<SentNotification> {
        self.outbox.lock().await.clone()
    }
}

#[async_trait]
impl NotificationSender for LoggingNotificationSender {
    async fn send_notification(
        &self,
        receiver: &UserId,
        data: NotificationData,
        notification: Notification,
    ) -> Result<(), NotificationError> {
        tracing::info!(
            receiver = %receiver,
            title = %notification.title,
            "push notification"
        );
        self.outbox.lock().await.push(SentNotification {
            receiver: receiver.clone(),
            data,
            notification,
        });
        Ok(())
    }
}
