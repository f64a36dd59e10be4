//! Conversion from hub snapshots to HTTP DTOs.

use irori_shared::time::to_rfc3339_millis;

use crate::hub::{ConnectionInfo, RelayStats, RoomSnapshot};

use super::http::{ConnectionDto, RelayStatsDto, RoomDetailDto, RoomSummaryDto};

impl From<&ConnectionInfo> for ConnectionDto {
    fn from(info: &ConnectionInfo) -> Self {
        Self {
            connection_id: info.connection_id.to_string(),
            user_id: info.user_id.to_string(),
            room_id: info.room_id.to_string(),
            connected_at: to_rfc3339_millis(info.connected_at),
        }
    }
}

impl From<&RoomSnapshot> for RoomSummaryDto {
    fn from(room: &RoomSnapshot) -> Self {
        Self {
            id: room.id.to_string(),
            private: room.private,
            member_count: room.members.len(),
            created_at: to_rfc3339_millis(room.created_at),
        }
    }
}

impl From<RoomSnapshot> for RoomDetailDto {
    fn from(room: RoomSnapshot) -> Self {
        Self {
            id: room.id.to_string(),
            private: room.private,
            members: room.members.iter().map(ConnectionDto::from).collect(),
            created_at: to_rfc3339_millis(room.created_at),
        }
    }
}

impl From<RelayStats> for RelayStatsDto {
    fn from(stats: RelayStats) -> Self {
        Self {
            depth: stats.depth,
            capacity: stats.capacity,
            dropped: stats.dropped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConnectionId, RoomId, UserId};
    use irori_shared::time::{Clock, FixedClock};

    fn snapshot() -> RoomSnapshot {
        let at = FixedClock::from_millis(1_672_531_200_000).now();
        RoomSnapshot {
            id: RoomId::new("room-1").unwrap(),
            private: true,
            created_at: at,
            members: vec![ConnectionInfo {
                connection_id: ConnectionId::generate(),
                user_id: UserId::new("alice").unwrap(),
                room_id: RoomId::new("room-1").unwrap(),
                connected_at: at,
            }],
        }
    }

    #[test]
    fn test_room_snapshot_to_summary() {
        // テスト項目: スナップショットからルーム概要 DTO に変換できる
        // given (前提条件):
        let room = snapshot();

        // when (操作):
        let dto = RoomSummaryDto::from(&room);

        // then (期待する結果):
        assert_eq!(dto.id, "room-1");
        assert!(dto.private);
        assert_eq!(dto.member_count, 1);
        assert_eq!(dto.created_at, "2023-01-01T00:00:00.000Z");
    }

    #[test]
    fn test_room_snapshot_to_detail() {
        // テスト項目: スナップショットからメンバー付きのルーム詳細 DTO に変換できる
        // given (前提条件):
        let room = snapshot();
        let connection_id = room.members[0].connection_id.to_string();

        // when (操作):
        let dto = RoomDetailDto::from(room);

        // then (期待する結果):
        assert_eq!(dto.members.len(), 1);
        assert_eq!(dto.members[0].connection_id, connection_id);
        assert_eq!(dto.members[0].user_id, "alice");
        assert_eq!(dto.members[0].room_id, "room-1");
    }
}
