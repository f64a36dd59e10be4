//! Wire message exchanged with chat clients.
//!
//! Frames are JSON objects of the form
//!
//! ```json
//! { "action": "send-message", "status": "done", "id": "...", "room_id": "...",
//!   "sender": { "id": "...", "name": "..." }, "receiver_id": "...",
//!   "content": "hi", "attachments": [], "created_at": "2024-01-01T00:00:00Z" }
//! ```
//!
//! `id` and `status` are assigned by the hub. Values sent by a client are
//! ignored while decoding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, de};

use super::{ConnectionId, MessageId, Notification, NotificationData, RoomId, UserId};

/// What a frame asks the hub to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    SendMessage,
    JoinRoom,
    LeaveRoom,
    #[serde(other)]
    Unknown,
}

/// Delivery status, always set by the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    #[default]
    Done,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Sender {
    #[serde(default, alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(skip_deserializing)]
    pub status: DeliveryStatus,
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub room_id: Option<RoomId>,
    #[serde(default)]
    pub sender: Sender,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub receiver_id: Option<UserId>,
    #[serde(default)]
    pub content: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl ChatMessage {
    /// Decode one inbound frame.
    ///
    /// A missing or `null` attachment list becomes an empty list and the
    /// status is always `done`.
    pub fn decode(frame: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(frame)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// In-band report of a frame the connection could not decode.
    ///
    /// The sender is the connection itself and the receiver is its user, so
    /// the report also reaches the user through the big room.
    pub fn decode_error(
        connection_id: ConnectionId,
        user_id: UserId,
        room_id: RoomId,
        reason: String,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            action: None,
            status: DeliveryStatus::Error,
            id: None,
            room_id: Some(room_id),
            sender: Sender {
                id: connection_id.to_string(),
                name: String::new(),
            },
            receiver_id: Some(user_id),
            content: reason,
            attachments: Vec::new(),
            created_at: Some(at),
        }
    }

    /// Server-originated message pushed to every connection.
    pub fn announcement(content: String, at: DateTime<Utc>) -> Self {
        Self {
            action: Some(Action::SendMessage),
            status: DeliveryStatus::Done,
            id: Some(MessageId::generate()),
            room_id: None,
            sender: Sender {
                id: String::new(),
                name: "system".to_string(),
            },
            receiver_id: None,
            content,
            attachments: Vec::new(),
            created_at: Some(at),
        }
    }

    /// Push payload: the sender's display name is the title and the content is the body.
    pub fn notification_payload(&self) -> (NotificationData, Notification) {
        (
            NotificationData {
                content: self.content.clone(),
            },
            Notification {
                title: self.sender.name.clone(),
                body: self.content.clone(),
            },
        )
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

fn blank_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<String>,
    T::Error: std::fmt::Display,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(value) if !value.trim().is_empty() => {
            T::try_from(value).map(Some).map_err(de::Error::custom)
        }
        _ => Ok(None),
    }
}
