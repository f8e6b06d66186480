use clap::Parser;

mod chat;
mod cli;
mod conversations;
mod server;

use chat::{run_chat, ChatOptions};
use cli::*;
use conversations::handle_conversations_command;
use relaychat_config::load_config;
use relaychat_util::init_tracing;
use server::run_server_command;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // The chat REPL owns the terminal, so logs go to a file unless asked otherwise.
    let log_dir = dirs::data_local_dir().map(|dir| dir.join("relaychat").join("log"));
    let _log_guard = init_tracing(log_dir, cli.print_logs);

    let project_dir = std::env::current_dir()?;
    let config = load_config(&project_dir, cli.config.as_deref())?;

    match cli.command {
        Some(Commands::Serve {
            port,
            hostname,
            cors,
        }) => {
            run_server_command(&config, port, hostname, cors).await?;
        }
        Some(Commands::Chat {
            relay_url,
            user,
            conversation,
            model,
        }) => {
            run_chat(
                &config,
                ChatOptions {
                    relay_url,
                    user,
                    conversation,
                    model,
                },
            )
            .await?;
        }
        Some(Commands::Conversations { action }) => {
            handle_conversations_command(&config, action).await?;
        }
        None => {
            run_chat(&config, ChatOptions::default()).await?;
        }
    }

    Ok(())
}
