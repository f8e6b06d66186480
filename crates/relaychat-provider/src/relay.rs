use std::time::Instant;

use bytes::Bytes;
use futures::StreamExt;
use reqwest::Client;
use tracing::{info, warn};

use crate::stream::ByteStream;
use crate::ProviderError;

pub const MISSING_KEY_BODY: &str = "Missing DEEPSEEK_API_KEY";
pub const UPSTREAM_ERROR_BODY: &str = "Upstream error";

const COMPLETIONS_PATH: &str = "/v1/chat/completions";

pub enum RelayOutcome {
    /// Upstream accepted the request; bytes are passed through untouched.
    Stream(ByteStream),
    /// Upstream rejected the request with this status and body.
    Failure { status: u16, body: String },
}

impl std::fmt::Debug for RelayOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayOutcome::Stream(_) => f.write_str("RelayOutcome::Stream"),
            RelayOutcome::Failure { status, body } => f
                .debug_struct("RelayOutcome::Failure")
                .field("status", status)
                .field("body", body)
                .finish(),
        }
    }
}

/// Forwards completion requests to the upstream provider.
#[derive(Debug, Clone)]
pub struct RelayGateway {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl RelayGateway {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self::with_client(Client::new(), base_url, api_key)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), COMPLETIONS_PATH)
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    /// Sends `body` verbatim. The body is never parsed or logged.
    pub async fn relay(&self, body: Bytes) -> Result<RelayOutcome, ProviderError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ProviderError::Configuration(MISSING_KEY_BODY.to_string()));
        };

        let started = Instant::now();
        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "upstream unreachable");
                ProviderError::Transport(e.to_string())
            })?;

        let status = response.status();
        info!(
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "upstream responded"
        );

        if !status.is_success() {
            let body = match response.text().await {
                Ok(text) if !text.is_empty() => text,
                Ok(_) => UPSTREAM_ERROR_BODY.to_string(),
                Err(e) => {
                    warn!(error = %e, "failed to read upstream error body");
                    UPSTREAM_ERROR_BODY.to_string()
                }
            };
            return Ok(RelayOutcome::Failure {
                status: status.as_u16(),
                body,
            });
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ProviderError::Stream(e.to_string())));

        Ok(RelayOutcome::Stream(Box::pin(stream)))
    }
}
