//! Storage interface consumed by the persistence relay.
//!
//! The hub only ever writes messages. Reading history back is the job of the
//! surrounding backend.

use async_trait::async_trait;

use super::{ChatMessage, StoreError};

/// Durable store for delivered chat messages.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist one delivered message.
    async fn insert(&self, message: &ChatMessage) -> Result<(), StoreError>;
}
