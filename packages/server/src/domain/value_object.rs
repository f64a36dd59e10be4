//! Identifiers used across the hub.
//!
//! `RoomId` and `UserId` are opaque strings issued by the surrounding
//! backend (match/conversation ids and account ids). `ConnectionId` and
//! `MessageId` are generated by the hub itself.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ValueObjectError;

/// Reserved id of the global "big room".
///
/// Broadcasts into this room are delivered only to the connections of the
/// message's receiver.
pub const BIG_ROOM_ID: &str = "000000000000000000000000";

/// Id of a room (a match/conversation, or the big room).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
    pub fn new(value: impl Into<String>) -> Result<Self, ValueObjectError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ValueObjectError::Blank("room id"));
        }
        Ok(Self(value))
    }

    /// The reserved big room.
    pub fn big_room() -> Self {
        Self(BIG_ROOM_ID.to_string())
    }

    pub fn is_big_room(&self) -> bool {
        self.0 == BIG_ROOM_ID
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoomId {
    type Error = ValueObjectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RoomId> for String {
    fn from(id: RoomId) -> Self {
        id.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Id of an authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Result<Self, ValueObjectError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ValueObjectError::Blank("user id"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = ValueObjectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-generated id of one physical connection. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl FromStr for ConnectionId {
    type Err = ValueObjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| ValueObjectError::InvalidConnectionId(s.to_string()))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Id assigned by the hub when a `send-message` frame is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_id_rejects_blank_value() {
        // テスト項目: 空白のみのルーム ID は作成できない
        // given (前提条件):
        let value = "   ";

        // when (操作):
        let result = RoomId::new(value);

        // then (期待する結果):
        assert_eq!(result, Err(ValueObjectError::Blank("room id")));
    }

    #[test]
    fn test_big_room_is_recognized() {
        // テスト項目: 予約済みの ID を持つルームだけが big room と判定される
        // given (前提条件):
        let big = RoomId::new(BIG_ROOM_ID).unwrap();
        let regular = RoomId::new("65f0c0ffee0000000000beef").unwrap();

        // when (操作):

        // then (期待する結果):
        assert!(big.is_big_room());
        assert_eq!(big, RoomId::big_room());
        assert!(!regular.is_big_room());
    }

    #[test]
    fn test_user_id_deserialization_validates() {
        // テスト項目: JSON から空のユーザー ID をデシリアライズするとエラーになる
        // given (前提条件):
        let json = r#""""#;

        // when (操作):
        let result = serde_json::from_str::<UserId>(json);

        // then (期待する結果):
        assert!(result.is_err());
    }

    #[test]
    fn test_connection_id_parses_its_display_form() {
        // テスト項目: ConnectionId は表示形式から再度パースできる
        // given (前提条件):
        let id = ConnectionId::generate();

        // when (操作):
        let parsed = id.to_string().parse::<ConnectionId>();

        // then (期待する結果):
        assert_eq!(parsed, Ok(id));
        assert!("not-a-uuid".parse::<ConnectionId>().is_err());
    }
}
