//! Request handlers.

mod http;
mod websocket;

pub use http::{
    broadcast_announcement, get_connection, get_room_detail, get_rooms, health_check,
    open_private_room,
};
pub use websocket::websocket_handler;
