//! Domain layer: identifiers, the wire message model and the collaborator
//! interfaces the hub depends on.

pub mod error;
pub mod message;
pub mod notification;
pub mod repository;
pub mod value_object;

pub use error::{JoinError, NotificationError, StoreError, ValueObjectError};
pub use message::{Action, ChatMessage, DeliveryStatus, Sender};
pub use notification::{Notification, NotificationData, NotificationSender};
pub use repository::MessageStore;
pub use value_object::{BIG_ROOM_ID, ConnectionId, MessageId, RoomId, UserId};

#[cfg(test)]
pub use notification::MockNotificationSender;
#[cfg(test)]
pub use repository::MockMessageStore;
