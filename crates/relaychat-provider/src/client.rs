use async_trait::async_trait;
use futures::StreamExt;
use relaychat_types::MessageRole;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::stream::ByteStream;
use crate::ProviderError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// OpenAI-compatible chat-completions body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub stream: bool,
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            stream: true,
            messages,
        }
    }
}

/// Opens a raw completion stream. Implemented over HTTP against the relay,
/// and by in-process fakes in tests.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct HttpChatClient {
    client: Client,
    relay_url: String,
}

impl HttpChatClient {
    pub fn new(relay_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            relay_url: relay_url.into(),
        }
    }

    pub fn relay_url(&self) -> &str {
        &self.relay_url
    }
}

#[async_trait]
impl ChatClient for HttpChatClient {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, ProviderError> {
        debug!(url = %self.relay_url, messages = request.messages.len(), "opening chat stream");

        let response = self
            .client
            .post(&self.relay_url)
            .header("Accept", "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Upstream {
                status_code: status.as_u16(),
                message: body,
            });
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ProviderError::Stream(e.to_string())));

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};

    async fn spawn_relay(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/api/chat", addr)
    }

    #[test]
    fn request_serializes_as_streaming_completion() {
        let request = ChatRequest::new(
            "deepseek-reasoner",
            vec![ChatMessage::user("Hello")],
        );
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "model": "deepseek-reasoner",
                "stream": true,
                "messages": [{"role": "user", "content": "Hello"}],
            })
        );
    }

    #[tokio::test]
    async fn open_stream_yields_relay_bytes() {
        let app = Router::new().route(
            "/api/chat",
            post(|Json(body): Json<ChatRequest>| async move {
                format!("data: {}\n", body.messages[0].content)
            }),
        );
        let url = spawn_relay(app).await;

        let client = HttpChatClient::new(url);
        let stream = client
            .open_stream(&ChatRequest::new("m", vec![ChatMessage::user("ping")]))
            .await
            .unwrap();
        let bytes: Vec<u8> = stream
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .flat_map(|chunk| chunk.unwrap().to_vec())
            .collect();
        assert_eq!(bytes, b"data: ping\n");
    }

    #[tokio::test]
    async fn relay_failure_becomes_upstream_error() {
        let app = Router::new().route(
            "/api/chat",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "rate limited") }),
        );
        let url = spawn_relay(app).await;

        let client = HttpChatClient::new(url);
        let err = client
            .open_stream(&ChatRequest::new("m", vec![]))
            .await
            .err()
            .unwrap();
        match err {
            ProviderError::Upstream {
                status_code,
                message,
            } => {
                assert_eq!(status_code, 429);
                assert_eq!(message, "rate limited");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
