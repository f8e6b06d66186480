use std::sync::Arc;

use relaychat_storage::MessageStore;
use relaychat_types::{Message, MessageRole, Transcript, TranscriptStatus};
use tracing::{debug, warn};

use crate::SessionError;

/// Decides whether a finished transcript becomes a stored assistant message.
#[derive(Clone)]
pub struct TranscriptSynchronizer {
    messages: Arc<dyn MessageStore>,
}

impl TranscriptSynchronizer {
    pub fn new(messages: Arc<dyn MessageStore>) -> Self {
        Self { messages }
    }

    pub async fn persist_user_message(
        &self,
        conversation_id: &str,
        text: &str,
    ) -> Result<Message, SessionError> {
        self.messages
            .insert(conversation_id, MessageRole::User, text)
            .await
            .map_err(|e| {
                warn!(conversation_id, error = %e, "failed to persist user message");
                SessionError::from(e)
            })
    }

    /// Stores a completed, non-empty transcript as one assistant message.
    /// Anything else is dropped.
    pub async fn finalize(&self, transcript: Transcript) -> Result<Option<Message>, SessionError> {
        let conversation_id = transcript.conversation_id().to_string();
        match transcript.status() {
            TranscriptStatus::Completed if transcript.buffer().is_empty() => {
                debug!(conversation_id = %conversation_id, "completed with empty reply, nothing stored");
                Ok(None)
            }
            TranscriptStatus::Completed => {
                let content = transcript.into_buffer();
                let message = self
                    .messages
                    .insert(&conversation_id, MessageRole::Assistant, &content)
                    .await
                    .map_err(|e| {
                        warn!(conversation_id = %conversation_id, error = %e, "failed to persist assistant message");
                        SessionError::from(e)
                    })?;
                Ok(Some(message))
            }
            status => {
                debug!(conversation_id = %conversation_id, ?status, "discarding transcript");
                Ok(None)
            }
        }
    }
}
