//! In-memory message store.
//!
//! Implements the domain's `MessageStore` with a `Vec` behind a mutex. Meant
//! for local runs and tests; a document database takes its place in
//! production.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{ChatMessage, MessageStore, RoomId, StoreError};

#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    messages: Mutex<Vec<ChatMessage>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored messages of one room, oldest first.
    pub async fn find_by_room(&self, room_id: &RoomId) -> Vec<ChatMessage> {
        let messages = self.messages.lock().await;
        messages
            .iter()
            .filter(|m| m.room_id.as_ref() == Some(room_id))
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.messages.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.lock().await.is_empty()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn insert(&self, message: &ChatMessage) -> Result<(), StoreError> {
        let id = message.id.ok_or(StoreError::MissingId)?;

        let mut messages = self.messages.lock().await;
        messages.push(message.clone());
        tracing::debug!(message_id = %id, total = messages.len(), "message stored");
        Ok(())
    }
}
