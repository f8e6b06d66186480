// ============================================================================
// SQLite Schema Definitions
// ============================================================================

/// Conversations table - one row per chat thread owned by a user
pub const CREATE_CONVERSATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    title TEXT NOT NULL,

    -- Milliseconds since epoch
    created_at INTEGER NOT NULL
);
"#;

/// Messages table - immutable user/assistant turns
pub const CREATE_MESSAGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL,
    role TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
    content TEXT NOT NULL,
    created_at INTEGER NOT NULL,

    FOREIGN KEY (conversation_id) REFERENCES conversations(id)
);
"#;

pub const CREATE_CONVERSATIONS_USER_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations(user_id, created_at)";

pub const CREATE_MESSAGES_CONVERSATION_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, created_at)";

pub const ALL_MIGRATIONS: &[&str] = &[
    CREATE_CONVERSATIONS_TABLE,
    CREATE_MESSAGES_TABLE,
    CREATE_CONVERSATIONS_USER_INDEX,
    CREATE_MESSAGES_CONVERSATION_INDEX,
];
