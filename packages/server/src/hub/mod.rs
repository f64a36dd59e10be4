//! The real-time chat hub.
//!
//! Actors, leaf to root:
//!
//! - [`Connection`]: one socket, a read loop and a write loop;
//! - [`RoomHub`]: membership and fan-out of one room;
//! - [`ServerHub`]: connection registry and room creation;
//! - [`PersistenceRelay`]: background storage and push notification.
//!
//! Actors talk only through channels. Each one owns its state and mutates it
//! from its own task.

pub mod connection;
pub mod relay;
pub mod room;
pub mod server;
pub mod transport;

use std::sync::Arc;

use futures_util::{Sink, Stream};
use irori_shared::time::{Clock, SystemClock};

use crate::{
    config::HubConfig,
    domain::{MessageStore, NotificationSender, RoomId, UserId},
};

pub use connection::{Connection, ConnectionHandle, ConnectionInfo};
pub use relay::{PersistenceRelay, RelayError, RelayHandle, RelayStats};
pub use room::{Fanout, RoomHandle, RoomHub, RoomSnapshot};
pub use server::{ServerHandle, ServerHub};
pub use transport::{Frame, TransportError};

/// Entry point to a running hub: the server hub, the relay and the settings
/// new connections are created with.
#[derive(Clone)]
pub struct Hub {
    server: ServerHandle,
    relay: RelayHandle,
    clock: Arc<dyn Clock>,
    config: HubConfig,
}

impl Hub {
    /// Spawn the server hub and the persistence relay on the current runtime.
    pub fn start(
        config: HubConfig,
        store: Arc<dyn MessageStore>,
        notifier: Arc<dyn NotificationSender>,
    ) -> Self {
        Self::start_with_clock(config, store, notifier, Arc::new(SystemClock))
    }

    pub fn start_with_clock(
        config: HubConfig,
        store: Arc<dyn MessageStore>,
        notifier: Arc<dyn NotificationSender>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = config.normalized();
        let relay = PersistenceRelay::spawn(
            store,
            notifier,
            config.relay_capacity,
            config.relay_overflow,
        );
        let server = ServerHub::spawn(config.clone(), clock.clone());

        Self {
            server,
            relay,
            clock,
            config,
        }
    }

    pub fn server(&self) -> &ServerHandle {
        &self.server
    }

    pub fn relay(&self) -> &RelayHandle {
        &self.relay
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Hand an upgraded connection to the hub and run it until it closes.
    pub async fn serve<I, O>(&self, room_id: RoomId, user_id: UserId, inbound: I, outbound: O)
    where
        I: Stream<Item = Result<Frame, TransportError>> + Unpin,
        O: Sink<String, Error = TransportError> + Unpin + Send + 'static,
    {
        let (connection, queue) = Connection::open(
            room_id,
            user_id,
            self.server.clone(),
            self.relay.clone(),
            self.clock.clone(),
            self.config.outbound_capacity,
        );
        connection.serve(queue, inbound, outbound).await;
    }
}
