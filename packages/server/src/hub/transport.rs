//! Transport abstraction between a physical socket and a [`Connection`](super::Connection).
//!
//! The connection loops read `Result<Frame, TransportError>` items from a
//! `Stream` and write encoded JSON text into a `Sink<String>`, so they do
//! not depend on a particular WebSocket implementation.

use thiserror::Error;

/// One inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    /// Ping/pong keepalives, answered by the WebSocket layer.
    Ping,
    /// Close frame with its optional status code.
    Close(Option<u16>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The peer went away without a close handshake.
    #[error("connection closed abnormally: {0}")]
    AbnormalClosure(String),

    #[error("transport failure: {0}")]
    Other(String),
}
