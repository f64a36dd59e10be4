//! Tuning knobs for the hub.

use clap::ValueEnum;

/// Capacity of the persistence relay queue.
pub const DEFAULT_RELAY_CAPACITY: usize = 256;

/// Maximum number of simultaneous connections one user may hold in a room.
pub const DEFAULT_MAX_DEVICES_PER_USER: usize = 5;

/// What the relay does when its queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OverflowPolicy {
    /// Drop the message and log a warning. The broadcast path never waits.
    #[default]
    Drop,
    /// Wait for the worker to make room.
    Block,
}

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Outbound queue size of each connection.
    pub outbound_capacity: usize,
    /// Command queue size of each room hub.
    pub room_queue_capacity: usize,
    /// Command queue size of the server hub.
    pub server_queue_capacity: usize,
    pub relay_capacity: usize,
    pub relay_overflow: OverflowPolicy,
    pub max_devices_per_user: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 32,
            room_queue_capacity: 64,
            server_queue_capacity: 64,
            relay_capacity: DEFAULT_RELAY_CAPACITY,
            relay_overflow: OverflowPolicy::Drop,
            max_devices_per_user: DEFAULT_MAX_DEVICES_PER_USER,
        }
    }
}

impl HubConfig {
    /// Clamp every capacity to at least one (tokio channels reject zero).
    pub fn normalized(mut self) -> Self {
        self.outbound_capacity = self.outbound_capacity.max(1);
        self.room_queue_capacity = self.room_queue_capacity.max(1);
        self.server_queue_capacity = self.server_queue_capacity.max(1);
        self.relay_capacity = self.relay_capacity.max(1);
        self.max_devices_per_user = self.max_devices_per_user.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        // テスト項目: デフォルト設定がリレー容量 256、端末上限 5、ドロップポリシーになる
        // given (前提条件):

        // when (操作):
        let config = HubConfig::default();

        // then (期待する結果):
        assert_eq!(config.relay_capacity, 256);
        assert_eq!(config.max_devices_per_user, 5);
        assert_eq!(config.relay_overflow, OverflowPolicy::Drop);
    }

    #[test]
    fn test_normalized_clamps_zero_capacities() {
        // テスト項目: 0 の容量は 1 に補正される
        // given (前提条件):
        let config = HubConfig {
            outbound_capacity: 0,
            room_queue_capacity: 0,
            server_queue_capacity: 0,
            relay_capacity: 0,
            relay_overflow: OverflowPolicy::Block,
            max_devices_per_user: 0,
        };

        // when (操作):
        let config = config.normalized();

        // then (期待する結果):
        assert_eq!(config.outbound_capacity, 1);
        assert_eq!(config.room_queue_capacity, 1);
        assert_eq!(config.server_queue_capacity, 1);
        assert_eq!(config.relay_capacity, 1);
        assert_eq!(config.max_devices_per_user, 1);
    }
}
