use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_UPSTREAM_BASE: &str = "https://api.deepseek.com";
pub const DEFAULT_MODEL: &str = "deepseek-reasoner";
pub const DEFAULT_HOSTNAME: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_USER_ID: &str = "local";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub upstream: UpstreamConfig,
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub stream: StreamConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relay_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    /// Append `reasoning_content` deltas to the visible transcript.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_reasoning: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Config {
    /// Later sources win field by field; unset fields keep the current value.
    pub fn merge(&mut self, other: Config) {
        merge_option_replace(&mut self.model, other.model);

        merge_option_replace(&mut self.upstream.base_url, other.upstream.base_url);
        merge_option_replace(&mut self.upstream.api_key, other.upstream.api_key);

        merge_option_replace(&mut self.server.hostname, other.server.hostname);
        merge_option_replace(&mut self.server.port, other.server.port);
        if !other.server.cors.is_empty() {
            self.server.cors = other.server.cors;
        }

        merge_option_replace(&mut self.client.relay_url, other.client.relay_url);
        merge_option_replace(&mut self.client.user_id, other.client.user_id);

        merge_option_replace(
            &mut self.stream.merge_reasoning,
            other.stream.merge_reasoning,
        );

        merge_option_replace(&mut self.storage.path, other.storage.path);
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn upstream_base(&self) -> &str {
        self.upstream
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_UPSTREAM_BASE)
            .trim_end_matches('/')
    }

    /// The credential, treating a blank value as absent.
    pub fn upstream_api_key(&self) -> Option<&str> {
        self.upstream
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    pub fn hostname(&self) -> &str {
        self.server.hostname.as_deref().unwrap_or(DEFAULT_HOSTNAME)
    }

    pub fn port(&self) -> u16 {
        self.server.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn relay_url(&self) -> String {
        self.client
            .relay_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}/api/chat", self.hostname(), self.port()))
    }

    pub fn user_id(&self) -> &str {
        self.client.user_id.as_deref().unwrap_or(DEFAULT_USER_ID)
    }

    pub fn merge_reasoning(&self) -> bool {
        self.stream.merge_reasoning.unwrap_or(false)
    }

    pub fn database_path(&self) -> PathBuf {
        self.storage.path.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("relaychat")
                .join("relaychat.db")
        })
    }
}

fn merge_option_replace<T>(target: &mut Option<T>, source: Option<T>) {
    if let Some(value) = source {
        *target = Some(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::default();
        assert_eq!(config.model(), "deepseek-reasoner");
        assert_eq!(config.upstream_base(), "https://api.deepseek.com");
        assert_eq!(config.relay_url(), "http://127.0.0.1:3000/api/chat");
        assert!(!config.merge_reasoning());
        assert!(config.upstream_api_key().is_none());
    }

    #[test]
    fn merge_keeps_unset_fields() {
        let mut base = Config {
            model: Some("deepseek-chat".to_string()),
            ..Default::default()
        };
        base.upstream.api_key = Some("sk-global".to_string());

        let mut project = Config::default();
        project.stream.merge_reasoning = Some(true);
        project.server.port = Some(8080);

        base.merge(project);
        assert_eq!(base.model(), "deepseek-chat");
        assert_eq!(base.upstream_api_key(), Some("sk-global"));
        assert!(base.merge_reasoning());
        assert_eq!(base.port(), 8080);
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let mut config = Config::default();
        config.upstream.api_key = Some("   ".to_string());
        assert!(config.upstream_api_key().is_none());
    }

    #[test]
    fn trailing_slash_trimmed_from_base() {
        let mut config = Config::default();
        config.upstream.base_url = Some("http://localhost:9000/".to_string());
        assert_eq!(config.upstream_base(), "http://localhost:9000");
    }
}
