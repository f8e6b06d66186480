//! Store contracts consumed by the history loader and the HTTP routes.
//!
//! The SQLite repositories implement these; tests swap in their own doubles.

use async_trait::async_trait;
use relaychat_types::{Conversation, Message, MessageRole};

use crate::database::DatabaseError;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Conversations owned by `user_id`, newest first.
    async fn list(&self, user_id: &str) -> Result<Vec<Conversation>, DatabaseError>;

    async fn get(&self, id: &str) -> Result<Option<Conversation>, DatabaseError>;

    async fn insert(&self, user_id: &str, title: &str) -> Result<Conversation, DatabaseError>;

    /// Fails with [`DatabaseError::NotFound`] when no row has `id`.
    async fn update(&self, id: &str, title: &str) -> Result<Conversation, DatabaseError>;

    /// Removes only the conversation row. Callers delete its messages first.
    async fn delete(&self, id: &str) -> Result<(), DatabaseError>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Messages of a conversation, oldest first.
    async fn list(&self, conversation_id: &str) -> Result<Vec<Message>, DatabaseError>;

    async fn insert(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<Message, DatabaseError>;

    async fn delete_for_conversation(&self, conversation_id: &str) -> Result<u64, DatabaseError>;
}
