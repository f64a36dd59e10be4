//! Server execution logic.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::hub::Hub;

use super::{
    handler::{
        broadcast_announcement, get_connection, get_room_detail, get_rooms, health_check,
        open_private_room, websocket_handler,
    },
    signal::shutdown_signal,
    state::AppState,
};

/// WebSocket chat server
///
/// # Example
///
/// ```ignore
/// let hub = Hub::start(HubConfig::default(), store, notifier);
/// Server::new(hub).run("127.0.0.1".to_string(), 8080).await?;
/// ```
pub struct Server {
    hub: Hub,
}

impl Server {
    pub fn new(hub: Hub) -> Self {
        Self { hub }
    }

    /// Build the router without binding a socket.
    pub fn router(&self) -> Router {
        let app_state = Arc::new(AppState {
            hub: self.hub.clone(),
        });

        Router::new()
            // WebSocket endpoint
            .route("/ws", get(websocket_handler))
            // HTTP endpoints
            .route("/api/health", get(health_check))
            .route("/api/rooms", get(get_rooms))
            .route("/api/rooms/{room_id}", get(get_room_detail))
            .route("/api/rooms/{room_id}/private", post(open_private_room))
            .route("/api/connections/{connection_id}", get(get_connection))
            .route("/api/broadcast", post(broadcast_announcement))
            .layer(TraceLayer::new_for_http())
            .with_state(app_state)
    }

    /// Run the WebSocket chat server
    ///
    /// # Arguments
    ///
    /// * `host` - The host address to bind to (e.g., "127.0.0.1")
    /// * `port` - The port number to bind to (e.g., 8080)
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the specified address or
    /// if there's an error during server execution.
    pub async fn run(self, host: String, port: u16) -> Result<(), Box<dyn std::error::Error>> {
        let app = self.router();

        let bind_addr = format!("{}:{}", host, port);
        let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

        tracing::info!("Chat hub listening on {}", listener.local_addr()?);
        tracing::info!("Connect to: ws://{}/ws?room=<room id>&user=<user id>", bind_addr);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");

        Ok(())
    }
}
