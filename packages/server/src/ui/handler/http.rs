//! HTTP API endpoint handlers.
//!
//! Every read goes through a query command into the owning hub task.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use irori_shared::time::Clock;

use crate::{
    domain::{ChatMessage, ConnectionId, RoomId, UserId},
    infrastructure::dto::http::{
        AnnouncementRequest, ConnectionDto, HealthDto, PrivateRoomRequest, PrivateRoomResponse,
        RoomDetailDto, RoomSummaryDto,
    },
    ui::state::AppState,
};

/// Health check endpoint, including the persistence queue depth
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthDto> {
    Json(HealthDto {
        status: "ok".to_string(),
        relay: state.hub.relay().stats().into(),
    })
}

/// Get list of rooms
pub async fn get_rooms(State(state): State<Arc<AppState>>) -> Json<Vec<RoomSummaryDto>> {
    let mut summaries = Vec::new();
    for room in state.hub.server().list_rooms().await {
        if let Some(snapshot) = room.snapshot().await {
            summaries.push(RoomSummaryDto::from(&snapshot));
        }
    }
    Json(summaries)
}

/// Get room detail by ID
pub async fn get_room_detail(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomDetailDto>, StatusCode> {
    let room_id = RoomId::new(room_id).map_err(|_| StatusCode::BAD_REQUEST)?;
    let room = state
        .hub
        .server()
        .find_room(&room_id)
        .await
        .ok_or(StatusCode::NOT_FOUND)?;
    let snapshot = room.snapshot().await.ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(RoomDetailDto::from(snapshot)))
}

/// Look up one connection in the server registry
pub async fn get_connection(
    State(state): State<Arc<AppState>>,
    Path(connection_id): Path<String>,
) -> Result<Json<ConnectionDto>, StatusCode> {
    let connection_id: ConnectionId = connection_id
        .parse()
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    state
        .hub
        .server()
        .find_connection(connection_id)
        .await
        .map(|info| Json(ConnectionDto::from(&info)))
        .ok_or(StatusCode::NOT_FOUND)
}

/// Push an announcement to every connection
pub async fn broadcast_announcement(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnnouncementRequest>,
) -> StatusCode {
    let message = ChatMessage::announcement(request.content, state.hub.clock().now());
    state.hub.server().broadcast(Arc::new(message)).await;
    StatusCode::ACCEPTED
}

/// Open a private room and pull every live connection of the given users into it
pub async fn open_private_room(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    Json(request): Json<PrivateRoomRequest>,
) -> Result<Json<PrivateRoomResponse>, StatusCode> {
    let room_id = RoomId::new(room_id).map_err(|_| StatusCode::BAD_REQUEST)?;
    let user_ids = request
        .user_ids
        .into_iter()
        .map(UserId::new)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    match state
        .hub
        .server()
        .open_private_room(room_id.clone(), user_ids)
        .await
    {
        Ok(joined_connections) => Ok(Json(PrivateRoomResponse {
            room_id: room_id.to_string(),
            joined_connections,
        })),
        Err(e) => {
            tracing::error!("Failed to open private room '{}': {}", room_id, e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}
