//! Server hub: the global connection registry and the only place rooms are
//! created.
//!
//! Like a room, the server hub owns its state inside a single task and is
//! driven by one command channel. Finding and creating a room happen in the
//! same command, so two connections can never create the same room twice.
//!
//! The loop never waits on a connection or a room: every room lookup goes
//! through it, so one slow consumer must not hold it up.

use std::{collections::HashMap, sync::Arc};

use irori_shared::time::Clock;
use tokio::sync::{mpsc, oneshot};

use crate::{
    config::HubConfig,
    domain::{ChatMessage, ConnectionId, JoinError, RoomId, UserId},
};

use super::{
    connection::{ConnectionHandle, ConnectionInfo, ControlEvent, DeliveryError},
    room::{RoomHandle, RoomHub},
};

#[derive(Debug)]
enum ServerCommand {
    Register(ConnectionHandle),
    Unregister(ConnectionId),
    Broadcast(Arc<ChatMessage>),
    FindRoom {
        room_id: RoomId,
        reply: oneshot::Sender<Option<RoomHandle>>,
    },
    JoinRoom {
        room_id: RoomId,
        reply: oneshot::Sender<Result<RoomHandle, JoinError>>,
    },
    OpenPrivateRoom {
        room_id: RoomId,
        user_ids: Vec<UserId>,
        reply: oneshot::Sender<usize>,
    },
    FindConnection {
        connection_id: ConnectionId,
        reply: oneshot::Sender<Option<ConnectionInfo>>,
    },
    ListRooms {
        reply: oneshot::Sender<Vec<RoomHandle>>,
    },
}

/// Cloneable address of the running [`ServerHub`].
#[derive(Debug, Clone)]
pub struct ServerHandle {
    commands: mpsc::Sender<ServerCommand>,
}

impl ServerHandle {
    pub async fn register(&self, connection: ConnectionHandle) {
        self.send(ServerCommand::Register(connection)).await;
    }

    pub async fn unregister(&self, connection_id: ConnectionId) {
        self.send(ServerCommand::Unregister(connection_id)).await;
    }

    /// Deliver a message to every registered connection.
    pub async fn broadcast(&self, message: Arc<ChatMessage>) {
        self.send(ServerCommand::Broadcast(message)).await;
    }

    pub async fn find_room(&self, room_id: &RoomId) -> Option<RoomHandle> {
        self.ask(|reply| ServerCommand::FindRoom {
            room_id: room_id.clone(),
            reply,
        })
        .await
        .flatten()
    }

    /// Resolve a room for an inbound `join-room` frame, creating a public room
    /// if none exists. Existing private rooms refuse the join.
    pub async fn join_room(&self, room_id: RoomId) -> Result<RoomHandle, JoinError> {
        self.ask(|reply| ServerCommand::JoinRoom { room_id, reply })
            .await
            .unwrap_or(Err(JoinError::HubStopped))
    }

    /// Open a private conversation: create the room as private if needed and
    /// register every live connection of `user_ids` into it.
    ///
    /// Returns the number of connections registered.
    pub async fn open_private_room(
        &self,
        room_id: RoomId,
        user_ids: Vec<UserId>,
    ) -> Result<usize, JoinError> {
        self.ask(|reply| ServerCommand::OpenPrivateRoom {
            room_id,
            user_ids,
            reply,
        })
        .await
        .ok_or(JoinError::HubStopped)
    }

    pub async fn find_connection(&self, connection_id: ConnectionId) -> Option<ConnectionInfo> {
        self.ask(|reply| ServerCommand::FindConnection {
            connection_id,
            reply,
        })
        .await
        .flatten()
    }

    /// Every room, ordered by id.
    pub async fn list_rooms(&self) -> Vec<RoomHandle> {
        self.ask(|reply| ServerCommand::ListRooms { reply })
            .await
            .unwrap_or_default()
    }

    async fn send(&self, command: ServerCommand) {
        if self.commands.send(command).await.is_err() {
            tracing::error!("server hub is not running");
        }
    }

    async fn ask<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> ServerCommand) -> Option<T> {
        let (reply, answer) = oneshot::channel();
        self.commands.send(command(reply)).await.ok()?;
        answer.await.ok()
    }
}

pub struct ServerHub {
    config: HubConfig,
    clock: Arc<dyn Clock>,
    connections: HashMap<ConnectionId, ConnectionHandle>,
    rooms: HashMap<RoomId, RoomHandle>,
}

impl ServerHub {
    /// Start the server hub task. It runs until every handle is dropped.
    pub fn spawn(config: HubConfig, clock: Arc<dyn Clock>) -> ServerHandle {
        let (commands, receiver) = mpsc::channel(config.server_queue_capacity.max(1));
        let hub = Self {
            config,
            clock,
            connections: HashMap::new(),
            rooms: HashMap::new(),
        };
        tokio::spawn(hub.run(receiver));

        ServerHandle { commands }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<ServerCommand>) {
        tracing::info!("server hub started");

        while let Some(command) = commands.recv().await {
            match command {
                ServerCommand::Register(connection) => {
                    self.connections.insert(connection.id(), connection);
                }
                ServerCommand::Unregister(connection_id) => {
                    self.connections.remove(&connection_id);
                }
                ServerCommand::Broadcast(message) => self.broadcast(message),
                ServerCommand::FindRoom { room_id, reply } => {
                    let _ = reply.send(self.rooms.get(&room_id).cloned());
                }
                ServerCommand::JoinRoom { room_id, reply } => {
                    let _ = reply.send(self.join_room(room_id));
                }
                ServerCommand::OpenPrivateRoom {
                    room_id,
                    user_ids,
                    reply,
                } => self.open_private_room(room_id, &user_ids, reply),
                ServerCommand::FindConnection {
                    connection_id,
                    reply,
                } => {
                    let _ = reply.send(
                        self.connections
                            .get(&connection_id)
                            .map(|c| c.info().clone()),
                    );
                }
                ServerCommand::ListRooms { reply } => {
                    let mut rooms: Vec<RoomHandle> = self.rooms.values().cloned().collect();
                    rooms.sort_by(|a, b| a.id().cmp(b.id()));
                    let _ = reply.send(rooms);
                }
            }
        }

        tracing::info!("server hub stopped");
    }

    fn join_room(&mut self, room_id: RoomId) -> Result<RoomHandle, JoinError> {
        match self.rooms.get(&room_id) {
            Some(room) if room.is_private() => Err(JoinError::PrivateRoom(room_id)),
            Some(room) => Ok(room.clone()),
            None => Ok(self.create_room(room_id, false)),
        }
    }

    /// Registration waits on the room's queue, so it runs on its own task and
    /// answers `reply` once every connection is in.
    fn open_private_room(
        &mut self,
        room_id: RoomId,
        user_ids: &[UserId],
        reply: oneshot::Sender<usize>,
    ) {
        let room = match self.rooms.get(&room_id) {
            Some(room) => room.clone(),
            None => self.create_room(room_id, true),
        };
        let members: Vec<ConnectionHandle> = self
            .connections
            .values()
            .filter(|c| user_ids.contains(c.user_id()))
            .cloned()
            .collect();

        tokio::spawn(async move {
            let mut joined = 0;
            for connection in members {
                if room.register(connection.clone()).await {
                    connection.notify(ControlEvent::Joined(room.clone()));
                    joined += 1;
                }
            }
            let _ = reply.send(joined);
        });
    }

    fn create_room(&mut self, room_id: RoomId, private: bool) -> RoomHandle {
        let room = RoomHub::spawn(room_id.clone(), private, self.clock.now(), &self.config);
        tracing::info!(room_id = %room_id, private, "room created");
        self.rooms.insert(room_id, room.clone());
        room
    }

    /// Full outbound queues drop the message; closed ones are unregistered.
    fn broadcast(&mut self, message: Arc<ChatMessage>) {
        let mut closed = Vec::new();
        for connection in self.connections.values() {
            match connection.try_deliver(message.clone()) {
                Ok(()) => {}
                Err(DeliveryError::Full(connection_id)) => {
                    tracing::warn!(connection_id = %connection_id, "outbound queue full, broadcast dropped");
                }
                Err(DeliveryError::Closed(connection_id)) => closed.push(connection_id),
            }
        }
        for connection_id in closed {
            self.connections.remove(&connection_id);
        }
    }
}
