use std::net::SocketAddr;
use std::sync::Arc;

use relaychat_config::Config;
use relaychat_server::ServerState;

pub(crate) async fn run_server_command(
    config: &Config,
    port: Option<u16>,
    hostname: Option<String>,
    cors: Vec<String>,
) -> anyhow::Result<()> {
    let bind_host = hostname.unwrap_or_else(|| config.hostname().to_string());
    let bind_port = port.unwrap_or_else(|| config.port());

    let mut origins = config.server.cors.clone();
    origins.extend(cors);
    let state = ServerState::from_config(config)
        .await?
        .with_cors_origins(origins);

    let addr: SocketAddr = format!("{}:{}", bind_host, bind_port).parse()?;
    println!("Starting RelayChat server on {}", addr);
    relaychat_server::run_server_with_state(addr, Arc::new(state)).await?;
    Ok(())
}
