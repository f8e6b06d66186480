use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header::HeaderValue, request::Parts};
use axum::Router;
use relaychat_config::Config;
use relaychat_provider::RelayGateway;
use relaychat_session::HistoryLoader;
use relaychat_storage::Database;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::routes;

pub struct ServerState {
    pub gateway: RelayGateway,
    pub loader: HistoryLoader,
    cors_origins: Vec<String>,
}

impl ServerState {
    pub fn new(gateway: RelayGateway, loader: HistoryLoader) -> Self {
        Self {
            gateway,
            loader,
            cors_origins: Vec::new(),
        }
    }

    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }

    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let db = Database::open(&config.database_path()).await?;
        let gateway = RelayGateway::new(
            config.upstream_base(),
            config.upstream_api_key().map(str::to_string),
        );
        if !gateway.has_credential() {
            tracing::warn!("DEEPSEEK_API_KEY is not set; relay requests will fail");
        }

        Ok(Self::new(gateway, HistoryLoader::from_database(&db))
            .with_cors_origins(config.server.cors.clone()))
    }
}

fn is_allowed_origin(origin: &str, extra: &[String]) -> bool {
    origin.starts_with("http://localhost:")
        || origin.starts_with("http://127.0.0.1:")
        || extra.iter().any(|allowed| allowed == origin)
}

fn cors_layer(extra: Vec<String>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &Parts| {
                origin
                    .to_str()
                    .map(|origin| is_allowed_origin(origin, &extra))
                    .unwrap_or(false)
            },
        ))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Router with CORS and tracing layers applied.
pub fn app(state: Arc<ServerState>) -> Router {
    routes::router()
        .layer(cors_layer(state.cors_origins.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(addr: SocketAddr, config: &Config) -> anyhow::Result<()> {
    let state = Arc::new(ServerState::from_config(config).await?);
    run_server_with_state(addr, state).await
}

pub async fn run_server_with_state(
    addr: SocketAddr,
    state: Arc<ServerState>,
) -> anyhow::Result<()> {
    let app = app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_origins_are_always_allowed() {
        assert!(is_allowed_origin("http://localhost:5173", &[]));
        assert!(is_allowed_origin("http://127.0.0.1:3000", &[]));
        assert!(!is_allowed_origin("https://evil.example", &[]));
    }

    #[test]
    fn configured_origins_are_allowed() {
        let extra = vec!["https://chat.example.com".to_string()];
        assert!(is_allowed_origin("https://chat.example.com", &extra));
        assert!(!is_allowed_origin("https://chat.example.com.evil", &extra));
    }
}
