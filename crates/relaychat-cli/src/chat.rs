use std::io::Write;
use std::sync::Arc;

use relaychat_config::Config;
use relaychat_provider::HttpChatClient;
use relaychat_session::{
    ControllerState, HistoryLoader, Notice, SessionConfig, SessionController, SessionHandle,
    SessionView, StaticIdentity,
};
use relaychat_storage::Database;
use relaychat_types::MessageRole;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, watch};

#[derive(Debug, Default)]
pub(crate) struct ChatOptions {
    pub(crate) relay_url: Option<String>,
    pub(crate) user: Option<String>,
    pub(crate) conversation: Option<String>,
    pub(crate) model: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum ReplCommand {
    Empty,
    Send(String),
    New,
    Switch(String),
    List,
    Rename(String),
    Delete(Option<String>),
    Stop,
    History,
    Help,
    Quit,
    Unknown(String),
}

fn parse_input(line: &str) -> ReplCommand {
    let line = line.trim();
    if line.is_empty() {
        return ReplCommand::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return ReplCommand::Send(line.to_string());
    };

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };
    match (name, arg) {
        ("new", _) => ReplCommand::New,
        ("switch", id) if !id.is_empty() => ReplCommand::Switch(id.to_string()),
        ("list", _) => ReplCommand::List,
        ("rename", title) if !title.is_empty() => ReplCommand::Rename(title.to_string()),
        ("delete", "") => ReplCommand::Delete(None),
        ("delete", id) => ReplCommand::Delete(Some(id.to_string())),
        ("stop", _) => ReplCommand::Stop,
        ("history", _) => ReplCommand::History,
        ("help", _) => ReplCommand::Help,
        ("quit" | "exit", _) => ReplCommand::Quit,
        _ => ReplCommand::Unknown(line.to_string()),
    }
}

const HELP: &str = "\
/new              start a new conversation
/switch <id>      open another conversation
/list             list conversations
/rename <title>   rename the active conversation
/delete [id]      delete a conversation (default: active)
/stop             stop the reply being streamed
/history          print the active conversation
/quit             leave";

pub(crate) async fn run_chat(config: &Config, opts: ChatOptions) -> anyhow::Result<()> {
    let db = Database::open(&config.database_path()).await?;
    let loader = HistoryLoader::from_database(&db);

    let user_id = opts.user.unwrap_or_else(|| config.user_id().to_string());
    let relay_url = opts.relay_url.unwrap_or_else(|| config.relay_url());
    let session_config = SessionConfig {
        model: opts.model.unwrap_or_else(|| config.model().to_string()),
        merge_reasoning: config.merge_reasoning(),
    };
    tracing::info!(user_id = %user_id, relay_url = %relay_url, "starting chat session");

    let handle = SessionController::spawn(
        session_config,
        loader,
        Arc::new(HttpChatClient::new(relay_url)),
        Arc::new(StaticIdentity::signed_in(user_id)),
    );

    match opts.conversation {
        Some(id) => handle.switch(id).await?,
        None => {
            if let Some(latest) = handle.conversations().await?.into_iter().next() {
                handle.switch(latest.id).await?;
            }
        }
    }
    print_history(&handle.view());
    println!("Type a message, or /help for commands.");

    let renderer = tokio::spawn(render_stream(handle.watch_view()));
    let reporter = tokio::spawn(report_notices(handle.notifications()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if !dispatch(&handle, parse_input(&line)).await {
            break;
        }
    }

    handle.cancel().await.ok();
    renderer.abort();
    reporter.abort();
    Ok(())
}

/// Runs one REPL command. Returns false when the user asked to leave.
async fn dispatch(handle: &SessionHandle, command: ReplCommand) -> bool {
    let result = match command {
        ReplCommand::Empty => Ok(()),
        ReplCommand::Quit => return false,
        ReplCommand::Help => {
            println!("{}", HELP);
            Ok(())
        }
        ReplCommand::Unknown(input) => {
            println!("Unknown command: {} (try /help)", input);
            Ok(())
        }
        // Busy rejections are printed by the notice reporter.
        ReplCommand::Send(text) => handle.submit(text).await.map(|_| ()),
        ReplCommand::Stop => handle.cancel().await.map(|_| ()),
        ReplCommand::New => handle.new_conversation().await.map(|conversation| {
            println!("Started {} ({})", conversation.title, conversation.id);
        }),
        ReplCommand::Switch(id) => handle.switch(id).await.map(|()| print_history(&handle.view())),
        ReplCommand::List => handle.conversations().await.map(|conversations| {
            let active = handle.view().active_conversation;
            for conversation in conversations {
                let marker = if active.as_deref() == Some(conversation.id.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!("{} {}  {}", marker, conversation.id, conversation.title);
            }
        }),
        ReplCommand::Rename(title) => match handle.view().active_conversation {
            Some(id) => handle
                .rename(id, title)
                .await
                .map(|renamed| println!("Renamed to {}", renamed.title)),
            None => {
                println!("No active conversation");
                Ok(())
            }
        },
        ReplCommand::Delete(id) => match id.or(handle.view().active_conversation) {
            Some(id) => handle.delete(id).await.map(|()| print_history(&handle.view())),
            None => {
                println!("No active conversation");
                Ok(())
            }
        },
        ReplCommand::History => {
            print_history(&handle.view());
            Ok(())
        }
    };

    if let Err(e) = result {
        if e != relaychat_session::SessionError::Busy {
            println!("Error: {}", e);
        }
    }
    true
}

fn print_history(view: &SessionView) {
    match view.active_conversation.as_deref() {
        Some(id) => println!("--- {} ---", id),
        None => println!("--- no conversation selected ---"),
    }
    for entry in &view.entries {
        println!("{}: {}", speaker(entry.role), entry.content);
    }
}

fn speaker(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "you",
        MessageRole::Assistant => "assistant",
    }
}

/// Prints the streaming reply as it grows.
async fn render_stream(mut view: watch::Receiver<SessionView>) {
    let mut printed = 0usize;
    let mut last_state = view.borrow().state;
    let mut stdout = std::io::stdout();

    while view.changed().await.is_ok() {
        let current = view.borrow_and_update().clone();

        if let Some(text) = current.streaming.as_deref() {
            if last_state != ControllerState::Requesting || text.len() < printed {
                printed = 0;
                let _ = write!(stdout, "assistant: ");
            }
            if let Some(fresh) = text.get(printed..).filter(|fresh| !fresh.is_empty()) {
                let _ = write!(stdout, "{}", fresh);
                printed = text.len();
            }
            let _ = stdout.flush();
        }

        if last_state == ControllerState::Requesting && current.state != ControllerState::Requesting {
            // Updates can coalesce; finish the reply from the stored entry.
            if current.state == ControllerState::Idle && current.notice.is_none() {
                if let Some(entry) = current.entries.last() {
                    if entry.role == MessageRole::Assistant {
                        let _ = write!(stdout, "{}", entry.content.get(printed..).unwrap_or_default());
                    }
                }
            }
            let _ = writeln!(stdout);
            if let Some(notice) = current.notice.as_deref() {
                let _ = writeln!(stdout, "[{}]", notice);
            }
            let _ = stdout.flush();
            printed = 0;
        }

        last_state = current.state;
    }
}

async fn report_notices(mut notices: broadcast::Receiver<Notice>) {
    loop {
        match notices.recv().await {
            Ok(Notice::Rejected(err)) => eprintln!("{}", err),
            Ok(Notice::PersistenceFailed { error, .. }) => {
                eprintln!("Could not save message: {}", error)
            }
            Ok(Notice::Failed { error, .. }) => tracing::warn!(error = %error, "request failed"),
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "notice reporter lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
