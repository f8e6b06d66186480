use relaychat_provider::ProviderError;
use relaychat_storage::DatabaseError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Request is in progress, please wait for the request to complete.")]
    Busy,

    #[error("Message is empty")]
    EmptyInput,

    #[error("Not signed in")]
    NotSignedIn,

    #[error("Conversation not found: {0}")]
    NoConversation(String),

    #[error("Conversation title must not be empty")]
    InvalidTitle,

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Session controller has stopped")]
    ControllerGone,
}

impl From<DatabaseError> for SessionError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(what) => SessionError::NoConversation(what),
            other => SessionError::Persistence(other.to_string()),
        }
    }
}

impl From<ProviderError> for SessionError {
    fn from(err: ProviderError) -> Self {
        SessionError::Provider(err.to_string())
    }
}
