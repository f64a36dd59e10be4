//! Room hub: owns the membership and message fan-out of exactly one room.
//!
//! All registrations, unregistrations and broadcasts for a room travel over
//! a single command channel and are applied one at a time by the room's own
//! task, which gives a total order per room and keeps the membership list
//! private to that task.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};

use crate::{
    config::HubConfig,
    domain::{ChatMessage, ConnectionId, RoomId},
};

use super::connection::{ConnectionHandle, ConnectionInfo, ControlEvent};

/// Delivery rule of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fanout {
    /// Every member receives every message.
    Everyone,
    /// Only members owned by the message's receiver. Used by the big room.
    ReceiverOnly,
}

impl Fanout {
    pub fn for_room(id: &RoomId) -> Self {
        if id.is_big_room() {
            Self::ReceiverOnly
        } else {
            Self::Everyone
        }
    }

    fn accepts(self, member: &ConnectionHandle, message: &ChatMessage) -> bool {
        match self {
            Self::Everyone => true,
            Self::ReceiverOnly => message.receiver_id.as_ref() == Some(member.user_id()),
        }
    }
}

#[derive(Debug)]
pub(crate) enum RoomCommand {
    Register(ConnectionHandle),
    Unregister(ConnectionId),
    Broadcast(Arc<ChatMessage>),
    Snapshot(oneshot::Sender<RoomSnapshot>),
}

/// Point-in-time view of a room, produced by the room's own task.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub id: RoomId,
    pub private: bool,
    pub created_at: DateTime<Utc>,
    /// Members in registration order.
    pub members: Vec<ConnectionInfo>,
}

/// Cloneable address of a running [`RoomHub`].
#[derive(Debug, Clone)]
pub struct RoomHandle {
    id: RoomId,
    private: bool,
    commands: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    /// Queue a registration. Returns `false` if the room task is gone.
    pub async fn register(&self, member: ConnectionHandle) -> bool {
        self.commands
            .send(RoomCommand::Register(member))
            .await
            .is_ok()
    }

    /// Queue an unregistration. Unknown connections are ignored by the room.
    pub async fn unregister(&self, connection_id: ConnectionId) {
        if self
            .commands
            .send(RoomCommand::Unregister(connection_id))
            .await
            .is_err()
        {
            tracing::debug!(room_id = %self.id, "room hub gone, unregister skipped");
        }
    }

    /// Queue a message for fan-out. Waits while the room's queue is full.
    pub async fn broadcast(&self, message: Arc<ChatMessage>) -> bool {
        self.commands
            .send(RoomCommand::Broadcast(message))
            .await
            .is_ok()
    }

    /// Ask the room for its membership. The answer reflects every command
    /// queued before this one.
    pub async fn snapshot(&self) -> Option<RoomSnapshot> {
        let (reply, answer) = oneshot::channel();
        self.commands.send(RoomCommand::Snapshot(reply)).await.ok()?;
        answer.await.ok()
    }
}

pub struct RoomHub {
    id: RoomId,
    private: bool,
    created_at: DateTime<Utc>,
    fanout: Fanout,
    max_devices_per_user: usize,
    members: Vec<ConnectionHandle>,
}

impl RoomHub {
    /// Start the room task and return its handle.
    ///
    /// The task stops once every handle has been dropped.
    pub fn spawn(
        id: RoomId,
        private: bool,
        created_at: DateTime<Utc>,
        config: &HubConfig,
    ) -> RoomHandle {
        let (commands, receiver) = mpsc::channel(config.room_queue_capacity.max(1));
        let hub = Self {
            fanout: Fanout::for_room(&id),
            id: id.clone(),
            private,
            created_at,
            max_devices_per_user: config.max_devices_per_user.max(1),
            members: Vec::new(),
        };
        tokio::spawn(hub.run(receiver));

        RoomHandle {
            id,
            private,
            commands,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<RoomCommand>) {
        tracing::debug!(room_id = %self.id, private = self.private, "room hub started");

        while let Some(command) = commands.recv().await {
            match command {
                RoomCommand::Register(member) => self.register(member),
                RoomCommand::Unregister(connection_id) => self.unregister(connection_id),
                RoomCommand::Broadcast(message) => self.broadcast(message).await,
                RoomCommand::Snapshot(reply) => {
                    let _ = reply.send(self.snapshot());
                }
            }
        }

        tracing::debug!(room_id = %self.id, "room hub stopped");
    }

    /// Admit a connection, evicting the user's oldest connection in this room
    /// when the user is already at the device cap.
    fn register(&mut self, member: ConnectionHandle) {
        if self.members.iter().any(|m| m.id() == member.id()) {
            return;
        }

        let same_user = self
            .members
            .iter()
            .filter(|m| m.user_id() == member.user_id())
            .count();
        if same_user >= self.max_devices_per_user {
            if let Some(oldest) = self
                .members
                .iter()
                .position(|m| m.user_id() == member.user_id())
            {
                let evicted = self.members.remove(oldest);
                tracing::info!(
                    room_id = %self.id,
                    user_id = %evicted.user_id(),
                    connection_id = %evicted.id(),
                    "device cap reached, evicting oldest connection"
                );
                evicted.notify(ControlEvent::Evicted(self.id.clone()));
            }
        }

        tracing::debug!(
            room_id = %self.id,
            connection_id = %member.id(),
            user_id = %member.user_id(),
            members = self.members.len() + 1,
            "connection registered"
        );
        self.members.push(member);
    }

    fn unregister(&mut self, connection_id: ConnectionId) {
        if let Some(index) = self.members.iter().position(|m| m.id() == connection_id) {
            self.members.remove(index);
            tracing::debug!(
                room_id = %self.id,
                connection_id = %connection_id,
                members = self.members.len(),
                "connection unregistered"
            );
        }
    }

    /// Deliver to every accepted member, one outbound queue at a time.
    ///
    /// A full outbound queue stalls this room until the member's writer drains
    /// it. Members whose queue is closed are dropped.
    async fn broadcast(&mut self, message: Arc<ChatMessage>) {
        let fanout = self.fanout;
        let mut closed = Vec::new();

        for member in self.members.iter().filter(|m| fanout.accepts(m, &message)) {
            if member.deliver(message.clone()).await.is_err() {
                closed.push(member.id());
            }
        }

        if !closed.is_empty() {
            self.members.retain(|m| !closed.contains(&m.id()));
            tracing::warn!(
                room_id = %self.id,
                dropped = closed.len(),
                "removed members with closed outbound queues"
            );
        }
    }

    fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            id: self.id.clone(),
            private: self.private,
            created_at: self.created_at,
            members: self.members.iter().map(|m| m.info().clone()).collect(),
        }
    }
}
