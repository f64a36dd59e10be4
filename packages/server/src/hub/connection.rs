//! Connection: bridges one physical socket to the hub.
//!
//! Each connection runs two loops:
//!
//! - the read loop decodes inbound frames and dispatches them
//!   (`send-message`, `join-room`, `leave-room`);
//! - the write loop drains the bounded outbound queue into the socket.
//!
//! When either loop ends the other is stopped and the connection unregisters
//! from every room it joined and from the server hub.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use irori_shared::time::Clock;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::domain::{Action, ChatMessage, ConnectionId, DeliveryStatus, MessageId, RoomId, UserId};

use super::{
    relay::RelayHandle,
    room::RoomHandle,
    server::ServerHandle,
    transport::{Frame, TransportError},
};

/// Identity of a connection as seen by rooms and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    /// Room the connection was bound to when it was handed to the hub.
    pub room_id: RoomId,
    pub connected_at: DateTime<Utc>,
}

/// Notifications a room or the server hub sends to a connection about its
/// own membership.
#[derive(Debug)]
pub(crate) enum ControlEvent {
    /// The connection was added to a room on its behalf.
    Joined(RoomHandle),
    /// A room dropped the connection to admit a newer device of the same user.
    Evicted(RoomId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("connection {0} is closed")]
    Closed(ConnectionId),

    #[error("outbound queue of connection {0} is full")]
    Full(ConnectionId),
}

/// Cloneable address of a connection, held by rooms and the server hub.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    info: ConnectionInfo,
    outbound: mpsc::Sender<Arc<ChatMessage>>,
    control: mpsc::UnboundedSender<ControlEvent>,
}

impl ConnectionHandle {
    /// Create a handle together with the receiving ends of its outbound queue
    /// and control channel.
    pub(crate) fn channel(
        info: ConnectionInfo,
        outbound_capacity: usize,
    ) -> (
        Self,
        mpsc::Receiver<Arc<ChatMessage>>,
        mpsc::UnboundedReceiver<ControlEvent>,
    ) {
        let (outbound, queue) = mpsc::channel(outbound_capacity.max(1));
        let (control, control_rx) = mpsc::unbounded_channel();
        (
            Self {
                info,
                outbound,
                control,
            },
            queue,
            control_rx,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.info.connection_id
    }

    pub fn user_id(&self) -> &UserId {
        &self.info.user_id
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    /// Place a message on the outbound queue, waiting while it is full.
    pub async fn deliver(&self, message: Arc<ChatMessage>) -> Result<(), DeliveryError> {
        self.outbound
            .send(message)
            .await
            .map_err(|_| DeliveryError::Closed(self.id()))
    }

    /// Place a message on the outbound queue without waiting.
    pub fn try_deliver(&self, message: Arc<ChatMessage>) -> Result<(), DeliveryError> {
        self.outbound.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Full(self.id()),
            TrySendError::Closed(_) => DeliveryError::Closed(self.id()),
        })
    }

    pub(crate) fn notify(&self, event: ControlEvent) {
        if self.control.send(event).is_err() {
            tracing::debug!(connection_id = %self.id(), "connection gone, control event dropped");
        }
    }
}

pub struct Connection {
    handle: ConnectionHandle,
    server: ServerHandle,
    relay: RelayHandle,
    clock: Arc<dyn Clock>,
    /// Rooms this connection is a member of.
    rooms: HashMap<RoomId, RoomHandle>,
    /// Rooms looked up for publishing. Rooms are never removed from the
    /// server hub, so a handle stays valid once found.
    routes: HashMap<RoomId, RoomHandle>,
    control: mpsc::UnboundedReceiver<ControlEvent>,
}

impl Connection {
    /// Create a connection bound to `room_id` and operated by `user_id`.
    ///
    /// Returns the connection and its outbound queue, which [`Connection::serve`]
    /// hands to the write loop.
    pub fn open(
        room_id: RoomId,
        user_id: UserId,
        server: ServerHandle,
        relay: RelayHandle,
        clock: Arc<dyn Clock>,
        outbound_capacity: usize,
    ) -> (Self, mpsc::Receiver<Arc<ChatMessage>>) {
        let info = ConnectionInfo {
            connection_id: ConnectionId::generate(),
            user_id,
            room_id,
            connected_at: clock.now(),
        };
        let (handle, queue, control) = ConnectionHandle::channel(info, outbound_capacity);

        (
            Self {
                handle,
                server,
                relay,
                clock,
                rooms: HashMap::new(),
                routes: HashMap::new(),
                control,
            },
            queue,
        )
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Run the connection until the socket closes, then clean up.
    pub async fn serve<I, O>(
        mut self,
        queue: mpsc::Receiver<Arc<ChatMessage>>,
        mut inbound: I,
        outbound: O,
    ) where
        I: Stream<Item = Result<Frame, TransportError>> + Unpin,
        O: Sink<String, Error = TransportError> + Unpin + Send + 'static,
    {
        let connection_id = self.handle.id();
        self.server.register(self.handle.clone()).await;
        tracing::info!(
            connection_id = %connection_id,
            user_id = %self.handle.user_id(),
            room_id = %self.handle.info.room_id,
            "connection opened"
        );

        let mut writer = tokio::spawn(write_loop(connection_id, queue, outbound));

        tokio::select! {
            _ = self.read_loop(&mut inbound) => writer.abort(),
            _ = &mut writer => {
                tracing::debug!(connection_id = %connection_id, "write loop finished first");
            }
        }

        self.close().await;
    }

    async fn read_loop<I>(&mut self, inbound: &mut I)
    where
        I: Stream<Item = Result<Frame, TransportError>> + Unpin,
    {
        let connection_id = self.handle.id();

        loop {
            // Membership changes are applied before any frame that follows them.
            tokio::select! {
                biased;
                Some(event) = self.control.recv() => self.apply_control(event),
                frame = inbound.next() => match frame {
                    Some(Ok(Frame::Text(text))) => self.handle_frame(text.as_bytes()).await,
                    Some(Ok(Frame::Binary(bytes))) => self.handle_frame(&bytes).await,
                    Some(Ok(Frame::Ping)) => {
                        tracing::trace!(connection_id = %connection_id, "keepalive");
                    }
                    Some(Ok(Frame::Close(code))) => {
                        tracing::info!(connection_id = %connection_id, ?code, "client requested close");
                        break;
                    }
                    Some(Err(TransportError::AbnormalClosure(reason))) => {
                        tracing::error!(connection_id = %connection_id, %reason, "connection closed abnormally");
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(connection_id = %connection_id, error = %e, "read failed");
                        break;
                    }
                    None => {
                        tracing::debug!(connection_id = %connection_id, "inbound stream ended");
                        break;
                    }
                },
            }
        }
    }

    fn apply_control(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::Joined(room) => {
                tracing::debug!(connection_id = %self.handle.id(), room_id = %room.id(), "joined room");
                self.rooms.insert(room.id().clone(), room);
            }
            ControlEvent::Evicted(room_id) => {
                tracing::info!(connection_id = %self.handle.id(), room_id = %room_id, "evicted from room");
                self.rooms.remove(&room_id);
            }
        }
    }

    async fn handle_frame(&mut self, payload: &[u8]) {
        match ChatMessage::decode(payload) {
            Ok(message) => self.dispatch(message).await,
            Err(e) => {
                tracing::warn!(connection_id = %self.handle.id(), error = %e, "failed to decode frame");
                self.publish_decode_error(e.to_string()).await;
            }
        }
    }

    async fn dispatch(&mut self, message: ChatMessage) {
        match message.action {
            Some(Action::SendMessage) => self.send_message(message).await,
            Some(Action::JoinRoom) => {
                let target = self.target_room(message.room_id);
                self.join_room(target).await;
            }
            Some(Action::LeaveRoom) => {
                let target = self.target_room(message.room_id);
                self.leave_room(target).await;
            }
            Some(Action::Unknown) | None => {
                tracing::debug!(connection_id = %self.handle.id(), "ignoring frame without a known action");
            }
        }
    }

    fn target_room(&self, requested: Option<RoomId>) -> RoomId {
        requested.unwrap_or_else(|| self.handle.info.room_id.clone())
    }

    /// Publish into the bound room, then into the big room, then hand the
    /// message to the relay. Dropped silently when the bound room does not exist.
    async fn send_message(&mut self, message: ChatMessage) {
        let room_id = self.handle.info.room_id.clone();
        let Some(room) = self.route(&room_id).await else {
            tracing::debug!(connection_id = %self.handle.id(), room_id = %room_id, "room not found, message dropped");
            return;
        };

        let message = Arc::new(self.accept(message));
        room.broadcast(message.clone()).await;

        if room_id.is_big_room() {
            return;
        }

        if let Some(big_room) = self.route(&RoomId::big_room()).await {
            big_room.broadcast(message.clone()).await;
        }

        if let Err(e) = self.relay.enqueue(message).await {
            tracing::warn!(connection_id = %self.handle.id(), room_id = %room_id, error = %e, "message not persisted");
        }
    }

    /// Resolve a room to publish into, asking the server hub only until the
    /// room exists.
    async fn route(&mut self, room_id: &RoomId) -> Option<RoomHandle> {
        if let Some(room) = self.routes.get(room_id) {
            return Some(room.clone());
        }
        let room = self.server.find_room(room_id).await?;
        self.routes.insert(room_id.clone(), room.clone());
        Some(room)
    }

    /// Fill in the fields the hub owns.
    fn accept(&self, mut message: ChatMessage) -> ChatMessage {
        message.id = Some(MessageId::generate());
        message.status = DeliveryStatus::Done;
        message.room_id = Some(self.handle.info.room_id.clone());
        message.sender.id = self.handle.user_id().to_string();
        message.created_at.get_or_insert_with(|| self.clock.now());
        message
    }

    async fn join_room(&mut self, room_id: RoomId) {
        if self.rooms.contains_key(&room_id) {
            return;
        }

        match self.server.join_room(room_id.clone()).await {
            Ok(room) => {
                // Recorded first so a close during registration still unregisters.
                self.rooms.insert(room_id.clone(), room.clone());
                if !room.register(self.handle.clone()).await {
                    self.rooms.remove(&room_id);
                }
            }
            Err(e) => {
                tracing::warn!(connection_id = %self.handle.id(), room_id = %room_id, error = %e, "join refused");
            }
        }
    }

    async fn leave_room(&mut self, room_id: RoomId) {
        if let Some(room) = self.rooms.remove(&room_id) {
            room.unregister(self.handle.id()).await;
        }
    }

    async fn publish_decode_error(&mut self, reason: String) {
        let room_id = self.handle.info.room_id.clone();
        let Some(room) = self.route(&room_id).await else {
            return;
        };

        let info = &self.handle.info;
        let report = ChatMessage::decode_error(
            info.connection_id,
            info.user_id.clone(),
            info.room_id.clone(),
            reason,
            self.clock.now(),
        );
        room.broadcast(Arc::new(report)).await;
    }

    async fn close(mut self) {
        let connection_id = self.handle.id();
        for (_, room) in self.rooms.drain() {
            room.unregister(connection_id).await;
        }
        self.server.unregister(connection_id).await;
        tracing::info!(connection_id = %connection_id, "connection closed");
    }
}

async fn write_loop<O>(
    connection_id: ConnectionId,
    mut queue: mpsc::Receiver<Arc<ChatMessage>>,
    mut sink: O,
) where
    O: Sink<String, Error = TransportError> + Unpin,
{
    while let Some(message) = queue.recv().await {
        let payload = match message.encode() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(connection_id = %connection_id, error = %e, "failed to encode message");
                continue;
            }
        };

        if let Err(e) = sink.send(payload).await {
            tracing::warn!(connection_id = %connection_id, error = %e, "write failed");
            break;
        }
    }

    let _ = sink.close().await;
}


#[cfg(test)]
mod tests {
    use std::{str::FromStr, time::Duration};

    use async_trait::async_trait;
    use irori_shared::time::FixedClock;
    use serde_json::Value;
    use tokio::{sync::mpsc::UnboundedSender, task::JoinHandle, time::timeout};

    use super::*;
    use crate::{
        config::HubConfig,
        domain::{BIG_ROOM_ID, MessageStore, StoreError},
        hub::{Hub, RoomSnapshot, transport::testing},
        infrastructure::{
            notification::LoggingNotificationSender, repository::InMemoryMessageStore,
        },
    };

    const NOW_MILLIS: i64 = 1_672_531_200_123;

    struct Client {
        frames: UnboundedSender<Result<Frame, TransportError>>,
        written: mpsc::UnboundedReceiver<String>,
        task: JoinHandle<()>,
    }

    impl Client {
        fn connect(hub: &Hub, room: &str, user: &str) -> Self {
            let (frames, inbound) = testing::inbound();
            let (outbound, written) = testing::outbound();
            let hub = hub.clone();
            let room_id = RoomId::new(room).unwrap();
            let user_id = UserId::new(user).unwrap();
            let task = tokio::spawn(async move { hub.serve(room_id, user_id, inbound, outbound).await });
            Self {
                frames,
                written,
                task,
            }
        }

        fn send(&self, frame: &str) {
            self.frames.send(Ok(Frame::Text(frame.to_string()))).unwrap();
        }

        fn join(&self, room: &str) {
            self.send(&format!(r#"{{"action":"join-room","room_id":"{room}"}}"#));
        }

        fn say(&self, content: &str) {
            self.send(&format!(
                r#"{{"action":"send-message","sender":{{"id":"spoofed","name":"Tester"}},"content":"{content}"}}"#
            ));
        }

        async fn next(&mut self) -> Value {
            let payload = timeout(Duration::from_secs(1), self.written.recv())
                .await
                .expect("no message written in time")
                .expect("write side closed");
            serde_json::from_str(&payload).unwrap()
        }
    }

    fn start_hub(config: HubConfig) -> (Hub, Arc<InMemoryMessageStore>) {
        let store = Arc::new(InMemoryMessageStore::new());
        let hub = Hub::start_with_clock(
            config,
            store.clone(),
            Arc::new(LoggingNotificationSender::new()),
            Arc::new(FixedClock::from_millis(NOW_MILLIS)),
        );
        (hub, store)
    }

    /// Poll a room until `done` holds for its snapshot.
    async fn wait_for_room(
        hub: &Hub,
        room: &str,
        done: impl Fn(&RoomSnapshot) -> bool,
    ) -> RoomSnapshot {
        let room_id = RoomId::new(room).unwrap();
        for _ in 0..200 {
            if let Some(room) = hub.server().find_room(&room_id).await {
                if let Some(snapshot) = room.snapshot().await {
                    if done(&snapshot) {
                        return snapshot;
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("room {room} never reached the expected state");
    }

    async fn wait_for_members(hub: &Hub, room: &str, count: usize) -> RoomSnapshot {
        wait_for_room(hub, room, |s| s.members.len() == count).await
    }

    async fn wait_for_stored(store: &InMemoryMessageStore, count: usize) {
        for _ in 0..200 {
            if store.len().await == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("store never held {count} messages");
    }

    /// Store that never finishes an insert.
    struct StalledStore;

    #[async_trait]
    impl MessageStore for StalledStore {
        async fn insert(&self, _message: &ChatMessage) -> Result<(), StoreError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_send_message_reaches_room_members_and_is_stored() {
        // テスト項目: 送信したメッセージがルームの全員に届き、1 回だけ保存される
        // given (前提条件):
        let (hub, store) = start_hub(HubConfig::default());
        let mut alice = Client::connect(&hub, "room-1", "alice");
        let mut bob = Client::connect(&hub, "room-1", "bob");
        alice.join("room-1");
        bob.join("room-1");
        wait_for_members(&hub, "room-1", 2).await;

        // when (操作):
        alice.send(
            r#"{"action":"send-message","room_id":"room-1","sender":{"id":"spoofed","name":"Alice"},"content":"hi","attachments":null}"#,
        );

        // then (期待する結果):
        let received = bob.next().await;
        assert_eq!(received["status"], "done");
        assert_eq!(received["room_id"], "room-1");
        assert_eq!(received["sender"]["id"], "alice");
        assert_eq!(received["sender"]["name"], "Alice");
        assert_eq!(received["content"], "hi");
        assert_eq!(received["attachments"], serde_json::json!([]));
        assert_eq!(received["created_at"], "2023-01-01T00:00:00.123Z");
        let id = received["id"].as_str().unwrap().to_string();
        assert!(!id.is_empty());
        assert_eq!(alice.next().await["id"], id.as_str());

        wait_for_stored(&store, 1).await;
        let stored = store.find_by_room(&RoomId::new("room-1").unwrap()).await;
        assert_eq!(stored[0].id.unwrap().to_string(), id);
    }

    #[tokio::test]
    async fn test_undecodable_frame_reports_error_and_keeps_connection() {
        // テスト項目: 解釈できないフレームはエラーメッセージを返し、接続は維持される
        // given (前提条件):
        let (hub, store) = start_hub(HubConfig::default());
        let mut alice = Client::connect(&hub, "room-1", "alice");
        alice.join("room-1");
        wait_for_members(&hub, "room-1", 1).await;

        // when (操作):
        alice.send("{not json");

        // then (期待する結果):
        let report = alice.next().await;
        assert_eq!(report["status"], "error");
        assert_eq!(report["receiver_id"], "alice");
        assert!(report.get("id").is_none());
        let connection_id = ConnectionId::from_str(report["sender"]["id"].as_str().unwrap()).unwrap();
        let info = hub.server().find_connection(connection_id).await.unwrap();
        assert_eq!(info.user_id.as_str(), "alice");

        alice.say("still here");
        let echoed = alice.next().await;
        assert_eq!(echoed["status"], "done");
        assert_eq!(echoed["content"], "still here");
        wait_for_stored(&store, 1).await;
    }

    #[tokio::test]
    async fn test_message_to_missing_room_is_dropped() {
        // テスト項目: 存在しないルームへの送信は黙って捨てられる
        // given (前提条件):
        let (hub, store) = start_hub(HubConfig::default());
        let mut alice = Client::connect(&hub, "room-1", "alice");

        // when (操作):
        alice.say("lost");
        alice.join("room-1");
        alice.say("kept");

        // then (期待する結果):
        assert_eq!(alice.next().await["content"], "kept");
        wait_for_stored(&store, 1).await;
        let stored = store.find_by_room(&RoomId::new("room-1").unwrap()).await;
        assert_eq!(stored[0].content, "kept");
    }

    #[tokio::test]
    async fn test_message_is_also_delivered_to_receiver_in_big_room() {
        // テスト項目: 受信者が big room にいれば、そちらにも受信者宛てで配信される
        // given (前提条件):
        let (hub, _store) = start_hub(HubConfig::default());
        let mut alice = Client::connect(&hub, "room-1", "alice");
        let mut bob = Client::connect(&hub, BIG_ROOM_ID, "bob");
        let mut carol = Client::connect(&hub, BIG_ROOM_ID, "carol");
        alice.join("room-1");
        bob.join(BIG_ROOM_ID);
        carol.join(BIG_ROOM_ID);
        wait_for_members(&hub, "room-1", 1).await;
        wait_for_members(&hub, BIG_ROOM_ID, 2).await;

        // when (操作):
        alice.send(r#"{"action":"send-message","receiver_id":"bob","content":"psst"}"#);
        alice.send(r#"{"action":"send-message","receiver_id":"carol","content":"second"}"#);

        // then (期待する結果):
        let to_bob = bob.next().await;
        assert_eq!(to_bob["content"], "psst");
        assert_eq!(to_bob["room_id"], "room-1");
        assert_eq!(carol.next().await["content"], "second");
        assert_eq!(alice.next().await["content"], "psst");
        assert_eq!(alice.next().await["content"], "second");
    }

    #[tokio::test]
    async fn test_leave_room_stops_delivery() {
        // テスト項目: leave-room したあとはそのルームのメッセージが届かない
        // given (前提条件):
        let (hub, _store) = start_hub(HubConfig::default());
        let mut alice = Client::connect(&hub, "room-1", "alice");
        let mut bob = Client::connect(&hub, "room-1", "bob");
        alice.join("room-1");
        bob.join("room-1");
        wait_for_members(&hub, "room-1", 2).await;

        // when (操作):
        bob.send(r#"{"action":"leave-room"}"#);
        wait_for_members(&hub, "room-1", 1).await;
        alice.say("after");

        // then (期待する結果):
        assert_eq!(alice.next().await["content"], "after");
        assert!(bob.written.try_recv().is_err());
        assert!(!bob.task.is_finished());
    }

    #[tokio::test]
    async fn test_close_unregisters_from_every_room_and_server() {
        // テスト項目: 切断すると全ルームとサーバーから登録が外れる
        // given (前提条件):
        let (hub, _store) = start_hub(HubConfig::default());
        let alice = Client::connect(&hub, "room-1", "alice");
        alice.join("room-1");
        alice.join(BIG_ROOM_ID);
        let snapshot = wait_for_members(&hub, "room-1", 1).await;
        wait_for_members(&hub, BIG_ROOM_ID, 1).await;
        let connection_id = snapshot.members[0].connection_id;

        // when (操作):
        alice.frames.send(Ok(Frame::Close(Some(1000)))).unwrap();
        timeout(Duration::from_secs(1), alice.task).await.unwrap().unwrap();

        // then (期待する結果):
        wait_for_members(&hub, "room-1", 0).await;
        wait_for_members(&hub, BIG_ROOM_ID, 0).await;
        assert!(hub.server().find_connection(connection_id).await.is_none());
    }

    #[tokio::test]
    async fn test_abnormal_closure_also_cleans_up() {
        // テスト項目: 異常切断でも接続は後始末される
        // given (前提条件):
        let (hub, _store) = start_hub(HubConfig::default());
        let alice = Client::connect(&hub, "room-1", "alice");
        alice.join("room-1");
        wait_for_members(&hub, "room-1", 1).await;

        // when (操作):
        alice
            .frames
            .send(Err(TransportError::AbnormalClosure("reset by peer".to_string())))
            .unwrap();

        // then (期待する結果):
        timeout(Duration::from_secs(1), alice.task).await.unwrap().unwrap();
        wait_for_members(&hub, "room-1", 0).await;
    }

    #[tokio::test]
    async fn test_write_failure_closes_connection() {
        // テスト項目: 書き込みに失敗した接続は閉じられ、ルームから外れる
        // given (前提条件):
        let (hub, _store) = start_hub(HubConfig::default());
        let Client {
            frames: alice_frames,
            written: alice_written,
            task: alice_task,
        } = Client::connect(&hub, "room-1", "alice");
        let mut bob = Client::connect(&hub, "room-1", "bob");
        alice_frames
            .send(Ok(Frame::Text(r#"{"action":"join-room"}"#.to_string())))
            .unwrap();
        bob.join("room-1");
        wait_for_members(&hub, "room-1", 2).await;

        // when (操作):
        drop(alice_written);
        bob.say("anyone there?");

        // then (期待する結果):
        assert_eq!(bob.next().await["content"], "anyone there?");
        timeout(Duration::from_secs(1), alice_task).await.unwrap().unwrap();
        wait_for_members(&hub, "room-1", 1).await;
    }

    #[tokio::test]
    async fn test_stalled_store_does_not_hold_back_delivery() {
        // テスト項目: 保存が止まっていても配信は続き、あふれた分は破棄される
        // given (前提条件):
        let config = HubConfig {
            relay_capacity: 1,
            ..HubConfig::default()
        };
        let store: Arc<dyn MessageStore> = Arc::new(StalledStore);
        let hub = Hub::start_with_clock(
            config,
            store,
            Arc::new(LoggingNotificationSender::new()),
            Arc::new(FixedClock::from_millis(NOW_MILLIS)),
        );
        let alice = Client::connect(&hub, "room-1", "alice");
        let mut bob = Client::connect(&hub, "room-1", "bob");
        alice.join("room-1");
        bob.join("room-1");
        wait_for_members(&hub, "room-1", 2).await;

        // when (操作):
        for i in 0..5 {
            alice.say(&format!("message {i}"));
        }

        // then (期待する結果):
        for i in 0..5 {
            assert_eq!(bob.next().await["content"], format!("message {i}"));
        }
        for _ in 0..200 {
            if hub.relay().stats().dropped >= 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(hub.relay().stats().dropped >= 3);
    }

    #[tokio::test]
    async fn test_private_room_membership_follows_server_side_join() {
        // テスト項目: サーバー側で参加させたプライベートルームから leave-room で抜けられ、他人はフレームで参加できない
        // given (前提条件):
        let (hub, _store) = start_hub(HubConfig::default());
        let alice = Client::connect(&hub, "lobby", "alice");
        let bob = Client::connect(&hub, "lobby", "bob");
        alice.join("lobby");
        bob.join("lobby");
        wait_for_members(&hub, "lobby", 2).await;

        // when (操作):
        let joined = hub
            .server()
            .open_private_room(
                RoomId::new("dm-1").unwrap(),
                vec![UserId::new("alice").unwrap()],
            )
            .await
            .unwrap();
        bob.join("dm-1");
        bob.join("elsewhere");
        wait_for_members(&hub, "elsewhere", 1).await;

        // then (期待する結果):
        assert_eq!(joined, 1);
        let dm = wait_for_members(&hub, "dm-1", 1).await;
        assert_eq!(dm.members[0].user_id.as_str(), "alice");
        assert!(dm.private);

        alice.send(r#"{"action":"leave-room","room_id":"dm-1"}"#);
        wait_for_members(&hub, "dm-1", 0).await;
    }

    #[tokio::test]
    async fn test_sixth_device_evicts_oldest() {
        // テスト項目: 同一ユーザーの 6 台目が参加すると最も古い端末が追い出され、配信されなくなる
        // given (前提条件):
        let (hub, _store) = start_hub(HubConfig::default());
        let mut devices = Vec::new();
        for count in 1..=5 {
            let device = Client::connect(&hub, "room-1", "alice");
            device.join("room-1");
            wait_for_members(&hub, "room-1", count).await;
            devices.push(device);
        }
        let oldest = wait_for_members(&hub, "room-1", 5).await.members[0].connection_id;

        // when (操作):
        let mut sixth = Client::connect(&hub, "room-1", "alice");
        sixth.join("room-1");
        wait_for_room(&hub, "room-1", |s| {
            s.members.len() == 5 && s.members.iter().all(|m| m.connection_id != oldest)
        })
        .await;
        let bob = Client::connect(&hub, "room-1", "bob");
        bob.join("room-1");
        wait_for_members(&hub, "room-1", 6).await;
        bob.say("hello devices");

        // then (期待する結果):
        assert_eq!(sixth.next().await["content"], "hello devices");
        assert_eq!(devices[1].next().await["content"], "hello devices");
        assert!(devices[0].written.try_recv().is_err());
        assert!(!devices[0].task.is_finished());
    }

    /// Create `room` with a member whose outbound queue holds one message and
    /// is never drained, then broadcast until the room's loop is stuck on it.
    /// The member is also registered with the server hub.
    async fn stall_room(
        hub: &Hub,
        room: &str,
    ) -> (
        mpsc::Receiver<Arc<ChatMessage>>,
        mpsc::UnboundedReceiver<ControlEvent>,
    ) {
        let (slow, slow_rx, slow_control) =
            crate::hub::connection::testing::member_with_capacity(room, "slow", 1);
        hub.server().register(slow.clone()).await;
        let handle = hub.server().join_room(RoomId::new(room).unwrap()).await.unwrap();
        handle.register(slow).await;
        for content in ["one", "two", "three"] {
            let message = ChatMessage::announcement(content.to_string(), Utc::now());
            handle.broadcast(Arc::new(message)).await;
        }
        (slow_rx, slow_control)
    }

    #[tokio::test]
    async fn test_stalled_room_does_not_hold_up_other_rooms() {
        // テスト項目: 遅い読み手で詰まったルームがあっても、別ルームの送受信とサーバー全体配信は止まらない
        // given (前提条件):
        let (hub, _store) = start_hub(HubConfig {
            room_queue_capacity: 1,
            ..HubConfig::default()
        });
        let _stalled = stall_room(&hub, "room-x").await;
        let mut alice = Client::connect(&hub, "room-y", "alice");
        let mut bob = Client::connect(&hub, "room-y", "bob");
        alice.join("room-y");
        bob.join("room-y");
        wait_for_members(&hub, "room-y", 2).await;

        // when (操作):
        let announcement = ChatMessage::announcement("maintenance".to_string(), Utc::now());
        hub.server().broadcast(Arc::new(announcement)).await;
        alice.say("still flowing");

        // then (期待する結果):
        assert_eq!(bob.next().await["content"], "maintenance");
        assert_eq!(bob.next().await["content"], "still flowing");
        assert_eq!(alice.next().await["content"], "maintenance");
        assert_eq!(alice.next().await["content"], "still flowing");
    }

    #[tokio::test]
    async fn test_close_during_pending_join_leaves_no_member_behind() {
        // テスト項目: 参加処理の途中で接続が閉じても、ルームに接続が残らない
        // given (前提条件):
        let (hub, _store) = start_hub(HubConfig {
            room_queue_capacity: 1,
            ..HubConfig::default()
        });
        let (mut slow_rx, _slow_control) = stall_room(&hub, "room-1").await;
        let Client {
            frames: alice_frames,
            written: alice_written,
            task: alice_task,
        } = Client::connect(&hub, "lobby", "alice");
        alice_frames
            .send(Ok(Frame::Text(r#"{"action":"join-room"}"#.to_string())))
            .unwrap();
        wait_for_members(&hub, "lobby", 1).await;
        alice_frames
            .send(Ok(Frame::Text(r#"{"action":"join-room","room_id":"room-1"}"#.to_string())))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // when (操作):
        drop(alice_written);
        let announcement = ChatMessage::announcement("bye".to_string(), Utc::now());
        hub.server().broadcast(Arc::new(announcement)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let drain = tokio::spawn(async move { while slow_rx.recv().await.is_some() {} });

        // then (期待する結果):
        timeout(Duration::from_secs(1), alice_task).await.unwrap().unwrap();
        let snapshot = wait_for_members(&hub, "room-1", 1).await;
        assert_eq!(snapshot.members[0].user_id.as_str(), "slow");
        wait_for_members(&hub, "lobby", 0).await;
        drain.abort();
    }
}
