//! Irori chat hub.
//!
//! Accepts many concurrent WebSocket connections, organizes them into rooms,
//! fans messages out to the right recipients and hands delivered messages to
//! a background relay for storage and push notification.

pub mod config;
pub mod domain;
pub mod hub;
pub mod infrastructure;
pub mod ui;
