use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// Title given to conversations created without an explicit one.
pub fn default_conversation_title(existing: usize) -> String {
    format!("New Conversation {}", existing + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_title_counts_from_one() {
        assert_eq!(default_conversation_title(0), "New Conversation 1");
        assert_eq!(default_conversation_title(4), "New Conversation 5");
    }
}
