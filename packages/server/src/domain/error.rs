//! Error types for the domain layer.

use thiserror::Error;

use super::RoomId;

/// Raised when a value object is constructed from invalid input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueObjectError {
    #[error("{0} must not be blank")]
    Blank(&'static str),

    #[error("invalid connection id '{0}'")]
    InvalidConnectionId(String),
}

/// Failure reported by a [`MessageStore`](super::MessageStore).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("message store unavailable: {0}")]
    Unavailable(String),

    #[error("message has no id")]
    MissingId,
}

/// Failure reported by a [`NotificationSender`](super::NotificationSender).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotificationError {
    #[error("push delivery failed: {0}")]
    DeliveryFailed(String),
}

/// Reasons a join request can be refused by the server hub.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("room '{0}' is private")]
    PrivateRoom(RoomId),

    #[error("server hub is not running")]
    HubStopped,
}
