use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use relaychat_types::{Conversation, Message, MessageRole};
use relaychat_util::id;

use crate::database::DatabaseError;
use crate::store::{ConversationStore, MessageStore};

#[derive(Debug, FromRow)]
struct ConversationRow {
    id: String,
    user_id: String,
    title: String,
    created_at: i64,
}

impl ConversationRow {
    fn into_conversation(self) -> Conversation {
        Conversation {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            created_at: millis_to_datetime(self.created_at),
        }
    }
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: String,
    conversation_id: String,
    role: String,
    content: String,
    created_at: i64,
}

impl MessageRow {
    fn into_message(self) -> Result<Message, DatabaseError> {
        let role = self
            .role
            .parse::<MessageRole>()
            .map_err(|e| DatabaseError::QueryError(e.to_string()))?;
        Ok(Message {
            id: self.id,
            conversation_id: self.conversation_id,
            role,
            content: self.content,
            created_at: millis_to_datetime(self.created_at),
        })
    }
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}

#[derive(Clone)]
pub struct ConversationRepository {
    pool: SqlitePool,
}

impl ConversationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationStore for ConversationRepository {
    async fn list(&self, user_id: &str) -> Result<Vec<Conversation>, DatabaseError> {
        let rows = sqlx::query_as::<_, ConversationRow>(
            r#"SELECT id, user_id, title, created_at
               FROM conversations
               WHERE user_id = ?
               ORDER BY created_at DESC, rowid DESC"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DatabaseError::QueryError(e.to_string()))?;

        Ok(rows.into_iter().map(ConversationRow::into_conversation).collect())
    }

    async fn get(&self, id: &str) -> Result<Option<Conversation>, DatabaseError> {
        let row = sqlx::query_as::<_, ConversationRow>(
            "SELECT id, user_id, title, created_at FROM conversations WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DatabaseError::QueryError(e.to_string()))?;

        Ok(row.map(ConversationRow::into_conversation))
    }

    async fn insert(&self, user_id: &str, title: &str) -> Result<Conversation, DatabaseError> {
        let now = Utc::now().timestamp_millis();
        let conversation = Conversation {
            id: id::conversation(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            created_at: millis_to_datetime(now),
        };

        sqlx::query("INSERT INTO conversations (id, user_id, title, created_at) VALUES (?, ?, ?, ?)")
            .bind(&conversation.id)
            .bind(&conversation.user_id)
            .bind(&conversation.title)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::QueryError(e.to_string()))?;

        Ok(conversation)
    }

    async fn update(&self, id: &str, title: &str) -> Result<Conversation, DatabaseError> {
        let result = sqlx::query("UPDATE conversations SET title = ? WHERE id = ?")
            .bind(title)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::QueryError(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("conversation {}", id)));
        }

        self.get(id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("conversation {}", id)))
    }

    async fn delete(&self, id: &str) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM conversations WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::QueryError(e.to_string()))?;

        Ok(())
    }
}

#[derive(Clone)]
pub struct MessageRepository {
    pool: SqlitePool,
}

impl MessageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for MessageRepository {
    async fn list(&self, conversation_id: &str) -> Result<Vec<Message>, DatabaseError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"SELECT id, conversation_id, role, content, created_at
               FROM messages
               WHERE conversation_id = ?
               ORDER BY created_at ASC, rowid ASC"#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DatabaseError::QueryError(e.to_string()))?;

        rows.into_iter().map(MessageRow::into_message).collect()
    }

    async fn insert(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<Message, DatabaseError> {
        let now = Utc::now().timestamp_millis();
        let message = Message {
            id: id::message(),
            conversation_id: conversation_id.to_string(),
            role,
            content: content.to_string(),
            created_at: millis_to_datetime(now),
        };

        sqlx::query(
            r#"INSERT INTO messages (id, conversation_id, role, content, created_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(&message.id)
        .bind(&message.conversation_id)
        .bind(role.as_str())
        .bind(&message.content)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::QueryError(e.to_string()))?;

        Ok(message)
    }

    async fn delete_for_conversation(&self, conversation_id: &str) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM messages WHERE conversation_id = ?")
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::QueryError(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    async fn repos() -> (ConversationRepository, MessageRepository) {
        let db = Database::in_memory().await.unwrap();
        (
            ConversationRepository::new(db.pool().clone()),
            MessageRepository::new(db.pool().clone()),
        )
    }

    #[tokio::test]
    async fn conversations_list_newest_first() {
        let (conversations, _) = repos().await;
        let first = conversations.insert("u1", "first").await.unwrap();
        let second = conversations.insert("u1", "second").await.unwrap();
        conversations.insert("u2", "other user").await.unwrap();

        let listed = conversations.list("u1").await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);
        assert!(listed
            .windows(2)
            .all(|pair| pair[0].created_at >= pair[1].created_at));
    }

    #[tokio::test]
    async fn messages_list_in_insertion_order() {
        let (conversations, messages) = repos().await;
        let conversation = conversations.insert("u1", "chat").await.unwrap();

        for (role, content) in [
            (MessageRole::User, "Hello"),
            (MessageRole::Assistant, "Hi there"),
            (MessageRole::User, "How are you?"),
        ] {
            messages.insert(&conversation.id, role, content).await.unwrap();
        }

        let listed = messages.list(&conversation.id).await.unwrap();
        let contents: Vec<&str> = listed.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["Hello", "Hi there", "How are you?"]);
        assert_eq!(listed[1].role, MessageRole::Assistant);
        assert!(listed
            .windows(2)
            .all(|pair| pair[0].created_at <= pair[1].created_at));
    }

    #[tokio::test]
    async fn update_renames_and_reports_missing_rows() {
        let (conversations, _) = repos().await;
        let conversation = conversations.insert("u1", "old").await.unwrap();

        let renamed = conversations.update(&conversation.id, "new").await.unwrap();
        assert_eq!(renamed.title, "new");
        assert_eq!(renamed.created_at, conversation.created_at);

        let missing = conversations.update("cnv_missing", "x").await;
        assert!(matches!(missing, Err(DatabaseError::NotFound(_))));
    }

    #[tokio::test]
    async fn delete_for_conversation_leaves_other_threads() {
        let (conversations, messages) = repos().await;
        let a = conversations.insert("u1", "a").await.unwrap();
        let b = conversations.insert("u1", "b").await.unwrap();
        messages.insert(&a.id, MessageRole::User, "one").await.unwrap();
        messages.insert(&a.id, MessageRole::Assistant, "two").await.unwrap();
        messages.insert(&b.id, MessageRole::User, "three").await.unwrap();

        assert_eq!(messages.delete_for_conversation(&a.id).await.unwrap(), 2);
        conversations.delete(&a.id).await.unwrap();

        assert!(conversations.get(&a.id).await.unwrap().is_none());
        assert_eq!(messages.list(&b.id).await.unwrap().len(), 1);
    }
}
