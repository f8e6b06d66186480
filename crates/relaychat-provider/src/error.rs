#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Upstream error (status {status_code}): {message}")]
    Upstream { status_code: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Stream error: {0}")]
    Stream(String),
}

impl ProviderError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::Upstream { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}
