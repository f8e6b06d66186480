use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "relaychat")]
#[command(about = "RelayChat - streaming chat relay and terminal client", long_about = None)]
pub(crate) struct Cli {
    /// Explicit config file, applied after the global and project files.
    #[arg(long, global = true)]
    pub(crate) config: Option<PathBuf>,
    #[arg(long = "print-logs", global = true, default_value_t = false)]
    pub(crate) print_logs: bool,
    #[command(subcommand)]
    pub(crate) command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    #[command(about = "Start the relay and conversation HTTP server")]
    Serve {
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        hostname: Option<String>,
        #[arg(long)]
        cors: Vec<String>,
    },
    #[command(about = "Chat interactively through the relay")]
    Chat {
        #[arg(long = "relay-url")]
        relay_url: Option<String>,
        #[arg(short = 'u', long)]
        user: Option<String>,
        #[arg(short = 'c', long)]
        conversation: Option<String>,
        #[arg(short = 'm', long)]
        model: Option<String>,
    },
    #[command(about = "Manage stored conversations")]
    Conversations {
        #[command(subcommand)]
        action: ConversationCommands,
    },
}

#[derive(Subcommand)]
pub(crate) enum ConversationCommands {
    #[command(about = "List conversations, newest first")]
    List {
        #[arg(short = 'u', long)]
        user: Option<String>,
    },
    #[command(about = "Print the messages of a conversation")]
    Show {
        #[arg(value_name = "ID")]
        id: String,
    },
    #[command(about = "Rename a conversation")]
    Rename {
        #[arg(value_name = "ID")]
        id: String,
        #[arg(value_name = "TITLE", trailing_var_arg = true)]
        title: Vec<String>,
    },
    #[command(about = "Delete a conversation and its messages")]
    Delete {
        #[arg(value_name = "ID")]
        id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rename_collects_title_words() {
        let cli = Cli::parse_from(["relaychat", "conversations", "rename", "cnv_1", "Trip", "plans"]);
        match cli.command {
            Some(Commands::Conversations {
                action: ConversationCommands::Rename { id, title },
            }) => {
                assert_eq!(id, "cnv_1");
                assert_eq!(title.join(" "), "Trip plans");
            }
            _ => panic!("expected conversations rename"),
        }
    }

    #[test]
    fn global_config_flag_after_subcommand() {
        let cli = Cli::parse_from(["relaychat", "serve", "--port", "8080", "--config", "x.jsonc"]);
        assert_eq!(cli.config, Some(PathBuf::from("x.jsonc")));
        assert!(matches!(cli.command, Some(Commands::Serve { port: Some(8080), .. })));
    }
}
