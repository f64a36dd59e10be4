//! WebSocket connection handler.
//!
//! Validates the room and user ids, upgrades the request and hands the split
//! socket to the hub. Authentication happens in front of this endpoint.

use std::sync::Arc;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt, future};
use serde::Deserialize;

use crate::{
    domain::{RoomId, UserId},
    hub::{Frame, TransportError},
    ui::state::AppState,
};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub room: String,
    pub user: String,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let room_id = RoomId::new(query.room).map_err(|e| {
        tracing::warn!("Rejecting connection: {}", e);
        StatusCode::BAD_REQUEST
    })?;
    let user_id = UserId::new(query.user).map_err(|e| {
        tracing::warn!("Rejecting connection: {}", e);
        StatusCode::BAD_REQUEST
    })?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, room_id, user_id)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, room_id: RoomId, user_id: UserId) {
    let (sender, receiver) = socket.split();

    let inbound = receiver.map(|result| {
        result
            .map(to_frame)
            .map_err(|e| TransportError::AbnormalClosure(e.to_string()))
    });
    let outbound = sender
        .sink_map_err(|e| TransportError::Other(e.to_string()))
        .with(|payload: String| future::ready(Ok::<_, TransportError>(Message::Text(payload.into()))));

    state.hub.serve(room_id, user_id, inbound, outbound).await;
}

fn to_frame(message: Message) -> Frame {
    match message {
        Message::Text(text) => Frame::Text(text.as_str().to_owned()),
        Message::Binary(bytes) => Frame::Binary(bytes.to_vec()),
        Message::Ping(_) | Message::Pong(_) => Frame::Ping,
        Message::Close(frame) => Frame::Close(frame.map(|f| f.code)),
    }
}
