use std::sync::Arc;

use relaychat_storage::{
    ConversationRepository, ConversationStore, Database, MessageRepository, MessageStore,
};
use relaychat_types::{default_conversation_title, Conversation, Message};
use tracing::info;

use crate::SessionError;

/// Conversation and history access on behalf of the controller and routes.
///
/// `list` is newest first while `load_messages` is oldest first.
#[derive(Clone)]
pub struct HistoryLoader {
    conversations: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageStore>,
}

impl HistoryLoader {
    pub fn new(conversations: Arc<dyn ConversationStore>, messages: Arc<dyn MessageStore>) -> Self {
        Self {
            conversations,
            messages,
        }
    }

    pub fn from_database(db: &Database) -> Self {
        Self::new(
            Arc::new(ConversationRepository::new(db.pool().clone())),
            Arc::new(MessageRepository::new(db.pool().clone())),
        )
    }

    pub fn message_store(&self) -> Arc<dyn MessageStore> {
        self.messages.clone()
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<Conversation>, SessionError> {
        Ok(self.conversations.list(user_id).await?)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Conversation>, SessionError> {
        Ok(self.conversations.get(id).await?)
    }

    pub async fn create(&self, user_id: &str, title: &str) -> Result<Conversation, SessionError> {
        let title = normalize_title(title)?;
        let conversation = self.conversations.insert(user_id, &title).await?;
        info!(conversation_id = %conversation.id, user_id, "conversation created");
        Ok(conversation)
    }

    /// Creates a conversation titled after the user's conversation count.
    pub async fn create_default(&self, user_id: &str) -> Result<Conversation, SessionError> {
        let existing = self.conversations.list(user_id).await?.len();
        self.create(user_id, &default_conversation_title(existing))
            .await
    }

    pub async fn rename(&self, id: &str, title: &str) -> Result<Conversation, SessionError> {
        let title = normalize_title(title)?;
        Ok(self.conversations.update(id, &title).await?)
    }

    pub async fn delete(&self, id: &str) -> Result<(), SessionError> {
        let removed = self.messages.delete_for_conversation(id).await?;
        self.conversations.delete(id).await?;
        info!(conversation_id = %id, messages = removed, "conversation deleted");
        Ok(())
    }

    pub async fn load_messages(&self, conversation_id: &str) -> Result<Vec<Message>, SessionError> {
        Ok(self.messages.list(conversation_id).await?)
    }
}

fn normalize_title(title: &str) -> Result<String, SessionError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(SessionError::InvalidTitle);
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaychat_types::MessageRole;

    async fn loader() -> HistoryLoader {
        let db = Database::in_memory().await.unwrap();
        HistoryLoader::from_database(&db)
    }

    #[tokio::test]
    async fn default_titles_follow_conversation_count() {
        let loader = loader().await;
        let first = loader.create_default("u1").await.unwrap();
        let second = loader.create_default("u1").await.unwrap();
        let other = loader.create_default("u2").await.unwrap();

        assert_eq!(first.title, "New Conversation 1");
        assert_eq!(second.title, "New Conversation 2");
        assert_eq!(other.title, "New Conversation 1");

        let listed = loader.list("u1").await.unwrap();
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
    }

    #[tokio::test]
    async fn rename_trims_and_rejects_blank_titles() {
        let loader = loader().await;
        let conversation = loader.create("u1", "draft").await.unwrap();

        let renamed = loader.rename(&conversation.id, "  Trip plans ").await.unwrap();
        assert_eq!(renamed.title, "Trip plans");

        assert_eq!(
            loader.rename(&conversation.id, "   ").await.unwrap_err(),
            SessionError::InvalidTitle
        );
        assert!(matches!(
            loader.rename("cnv_unknown", "x").await.unwrap_err(),
            SessionError::NoConversation(_)
        ));
    }

    #[tokio::test]
    async fn delete_removes_messages_then_conversation() {
        let loader = loader().await;
        let conversation = loader.create("u1", "chat").await.unwrap();
        let store = loader.message_store();
        store
            .insert(&conversation.id, MessageRole::User, "Hello")
            .await
            .unwrap();
        store
            .insert(&conversation.id, MessageRole::Assistant, "Hi there")
            .await
            .unwrap();

        loader.delete(&conversation.id).await.unwrap();

        assert!(loader.get(&conversation.id).await.unwrap().is_none());
        assert!(loader.load_messages(&conversation.id).await.unwrap().is_empty());
        assert!(loader.list("u1").await.unwrap().is_empty());
    }
}
