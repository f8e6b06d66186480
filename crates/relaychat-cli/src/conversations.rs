use relaychat_config::Config;
use relaychat_session::HistoryLoader;
use relaychat_storage::Database;

use crate::cli::ConversationCommands;

pub(crate) async fn handle_conversations_command(
    config: &Config,
    action: ConversationCommands,
) -> anyhow::Result<()> {
    let db = Database::open(&config.database_path()).await?;
    let loader = HistoryLoader::from_database(&db);

    match action {
        ConversationCommands::List { user } => {
            let user_id = user.unwrap_or_else(|| config.user_id().to_string());
            let conversations = loader.list(&user_id).await?;
            if conversations.is_empty() {
                println!("No conversations for {}", user_id);
            }
            for conversation in conversations {
                println!(
                    "{}  {}  {}",
                    conversation.id,
                    conversation.created_at.format("%Y-%m-%d %H:%M"),
                    conversation.title
                );
            }
        }
        ConversationCommands::Show { id } => {
            let Some(conversation) = loader.get(&id).await? else {
                anyhow::bail!("Conversation not found: {}", id);
            };
            println!("# {}", conversation.title);
            for message in loader.load_messages(&id).await? {
                println!("{}: {}", message.role, message.content);
            }
        }
        ConversationCommands::Rename { id, title } => {
            let renamed = loader.rename(&id, &title.join(" ")).await?;
            println!("Renamed {} to {}", renamed.id, renamed.title);
        }
        ConversationCommands::Delete { id } => {
            if loader.get(&id).await?.is_none() {
                anyhow::bail!("Conversation not found: {}", id);
            }
            loader.delete(&id).await?;
            println!("Deleted {}", id);
        }
    }

    Ok(())
}
