//! Push-notification interface consumed by the persistence relay.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{NotificationError, UserId};

/// Data payload handed to the client app alongside the notification.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NotificationData {
    pub content: String,
}

/// Visible part of a push notification.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Push a notification to every device registered for `receiver`.
    async fn send_notification(
        &self,
        receiver: &UserId,
        data: NotificationData,
        notification: Notification,
    ) -> Result<(), NotificationError>;
}
