//! HTTP API DTOs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthDto {
    pub status: String,
    pub relay: RelayStatsDto,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayStatsDto {
    pub depth: usize,
    pub capacity: usize,
    pub dropped: u64,
}

/// Room summary for the list endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummaryDto {
    pub id: String,
    pub private: bool,
    pub member_count: usize,
    pub created_at: String,
}

/// Room detail with its members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomDetailDto {
    pub id: String,
    pub private: bool,
    pub members: Vec<ConnectionDto>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDto {
    pub connection_id: String,
    pub user_id: String,
    pub room_id: String,
    pub connected_at: String,
}

/// Body of `POST /api/broadcast`
#[derive(Debug, Clone, Deserialize)]
pub struct AnnouncementRequest {
    pub content: String,
}

/// Body of `POST /api/rooms/{room_id}/private`
#[derive(Debug, Clone, Deserialize)]
pub struct PrivateRoomRequest {
    pub user_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateRoomResponse {
    pub room_id: String,
    pub joined_connections: usize,
}
