//! Single-flight session controller.
//!
//! One task owns the session state. [`SessionHandle`] sends it commands and
//! observes a [`SessionView`] through a watch channel. Each request runs a
//! network pump in its own task; the pump forwards raw lines tagged with the
//! request they belong to, and lines whose tag is no longer current are
//! dropped.

use std::sync::Arc;

use futures::StreamExt;
use relaychat_provider::{ChatClient, ChatMessage, ChatRequest, DecodeStep, LineSplitter, StreamDecoder};
use relaychat_types::{Conversation, Message, MessageRole, Transcript, UserSession};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::identity::IdentityProvider;
use crate::loader::HistoryLoader;
use crate::synchronizer::TranscriptSynchronizer;
use crate::SessionError;

pub const ABORTED_NOTICE: &str = "Request is aborted";
pub const FAILED_NOTICE: &str = "Request failed, please try again!";

const COMMAND_BUFFER: usize = 32;
const NOTICE_BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub model: String,
    pub merge_reasoning: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: "deepseek-reasoner".to_string(),
            merge_reasoning: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerState {
    #[default]
    Idle,
    Requesting,
    Aborting,
}

/// Identifies one request. A result is applied only while its tag is the
/// in-flight tag and its conversation is still the active one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestTag {
    pub conversation_id: String,
    pub seq: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewEntry {
    pub role: MessageRole,
    pub content: String,
    /// `None` when the entry never made it to storage.
    pub message_id: Option<String>,
}

impl From<Message> for ViewEntry {
    fn from(message: Message) -> Self {
        Self {
            role: message.role,
            content: message.content,
            message_id: Some(message.id),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionView {
    pub state: ControllerState,
    pub user_id: Option<String>,
    pub active_conversation: Option<String>,
    pub entries: Vec<ViewEntry>,
    /// Text of the reply being streamed.
    pub streaming: Option<String>,
    /// Terminal notice shown after the entries, never stored.
    pub notice: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Rejected(SessionError),
    Completed {
        conversation_id: String,
        message_id: Option<String>,
    },
    Aborted {
        conversation_id: String,
        explicit: bool,
    },
    Failed {
        conversation_id: String,
        error: String,
    },
    PersistenceFailed {
        conversation_id: String,
        error: String,
    },
    SignedOut,
}

enum Command {
    Submit {
        text: String,
        reply: oneshot::Sender<Result<RequestTag, SessionError>>,
    },
    Cancel {
        reply: oneshot::Sender<bool>,
    },
    Switch {
        conversation_id: String,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    NewConversation {
        reply: oneshot::Sender<Result<Conversation, SessionError>>,
    },
    Rename {
        conversation_id: String,
        title: String,
        reply: oneshot::Sender<Result<Conversation, SessionError>>,
    },
    Delete {
        conversation_id: String,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Conversations {
        reply: oneshot::Sender<Result<Vec<Conversation>, SessionError>>,
    },
    SignOut {
        reply: oneshot::Sender<()>,
    },
}

#[derive(Debug)]
enum PumpEvent {
    Line { tag: RequestTag, line: String },
    End { tag: RequestTag, end: PumpEnd },
}

#[derive(Debug)]
enum PumpEnd {
    Closed,
    Aborted,
    Failed(SessionError),
}

/// Reports the end of a pump exactly once, including on panic.
struct PumpGuard {
    tag: RequestTag,
    events: mpsc::UnboundedSender<PumpEvent>,
    end: Option<PumpEnd>,
}

impl PumpGuard {
    fn finish(&mut self, end: PumpEnd) {
        self.end = Some(end);
    }
}

impl Drop for PumpGuard {
    fn drop(&mut self) {
        let end = self
            .end
            .take()
            .unwrap_or_else(|| {
                PumpEnd::Failed(SessionError::Provider(
                    "stream task ended unexpectedly".to_string(),
                ))
            });
        let _ = self.events.send(PumpEvent::End {
            tag: self.tag.clone(),
            end,
        });
    }
}

async fn pump(
    client: Arc<dyn ChatClient>,
    request: ChatRequest,
    token: CancellationToken,
    mut guard: PumpGuard,
) {
    let tag = guard.tag.clone();
    let events = guard.events.clone();

    let opened = tokio::select! {
        biased;
        _ = token.cancelled() => {
            guard.finish(PumpEnd::Aborted);
            return;
        }
        opened = client.open_stream(&request) => opened,
    };
    let mut stream = match opened {
        Ok(stream) => stream,
        Err(e) => {
            guard.finish(PumpEnd::Failed(e.into()));
            return;
        }
    };

    let mut splitter = LineSplitter::new();
    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => {
                guard.finish(PumpEnd::Aborted);
                return;
            }
            next = stream.next() => next,
        };

        match next {
            Some(Ok(bytes)) => {
                for line in splitter.push(&bytes) {
                    if events
                        .send(PumpEvent::Line {
                            tag: tag.clone(),
                            line,
                        })
                        .is_err()
                    {
                        return;
                    }
                }
            }
            Some(Err(e)) => {
                guard.finish(PumpEnd::Failed(e.into()));
                return;
            }
            None => {
                if let Some(line) = splitter.finish() {
                    let _ = events.send(PumpEvent::Line {
                        tag: tag.clone(),
                        line,
                    });
                }
                guard.finish(PumpEnd::Closed);
                return;
            }
        }
    }
}

struct InFlight {
    tag: RequestTag,
    token: CancellationToken,
    transcript: Transcript,
    decoder: StreamDecoder,
}

pub struct SessionController {
    config: SessionConfig,
    loader: HistoryLoader,
    synchronizer: TranscriptSynchronizer,
    client: Arc<dyn ChatClient>,
    identity: Arc<dyn IdentityProvider>,
    view_tx: watch::Sender<SessionView>,
    notices: broadcast::Sender<Notice>,
    pump_tx: mpsc::UnboundedSender<PumpEvent>,

    state: ControllerState,
    user: Option<UserSession>,
    active: Option<String>,
    entries: Vec<ViewEntry>,
    notice: Option<String>,
    inflight: Option<InFlight>,
    aborting: Option<RequestTag>,
    next_seq: u64,
}

impl SessionController {
    pub fn spawn(
        config: SessionConfig,
        loader: HistoryLoader,
        client: Arc<dyn ChatClient>,
        identity: Arc<dyn IdentityProvider>,
    ) -> SessionHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (pump_tx, pump_rx) = mpsc::unbounded_channel();
        let (notices, _) = broadcast::channel(NOTICE_BUFFER);

        let user = identity.current_session();
        let initial = SessionView {
            user_id: user.as_ref().map(|u| u.user_id.clone()),
            ..SessionView::default()
        };
        let (view_tx, view_rx) = watch::channel(initial);

        let controller = Self {
            config,
            synchronizer: TranscriptSynchronizer::new(loader.message_store()),
            loader,
            client,
            identity: identity.clone(),
            view_tx,
            notices: notices.clone(),
            pump_tx,
            state: ControllerState::Idle,
            user,
            active: None,
            entries: Vec::new(),
            notice: None,
            inflight: None,
            aborting: None,
            next_seq: 0,
        };

        let identity_rx = identity.subscribe();
        tokio::spawn(controller.run(command_rx, pump_rx, identity_rx));

        SessionHandle {
            commands: command_tx,
            view: view_rx,
            notices,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut pump_rx: mpsc::UnboundedReceiver<PumpEvent>,
        mut identity_rx: watch::Receiver<Option<UserSession>>,
    ) {
        let mut identity_open = true;
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(event) = pump_rx.recv() => self.handle_pump(event).await,
                changed = identity_rx.changed(), if identity_open => match changed {
                    Ok(()) => {
                        let session = identity_rx.borrow_and_update().clone();
                        self.handle_identity(session).await;
                    }
                    Err(_) => identity_open = false,
                },
            }
        }

        self.abort_inflight(false).await;
        debug!("session controller stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Submit { text, reply } => {
                let result = self.submit(text).await;
                let _ = reply.send(result);
            }
            Command::Cancel { reply } => {
                let cancelled = self.abort_inflight(true).await;
                let _ = reply.send(cancelled);
            }
            Command::Switch {
                conversation_id,
                reply,
            } => {
                let result = self.switch(conversation_id).await;
                let _ = reply.send(result);
            }
            Command::NewConversation { reply } => {
                let result = self.new_conversation().await;
                let _ = reply.send(result);
            }
            Command::Rename {
                conversation_id,
                title,
                reply,
            } => {
                let result = match self.owned_conversation(&conversation_id).await {
                    Ok(_) => self.loader.rename(&conversation_id, &title).await,
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            Command::Delete {
                conversation_id,
                reply,
            } => {
                let result = self.delete(conversation_id).await;
                let _ = reply.send(result);
            }
            Command::Conversations { reply } => {
                let result = match self.user_id() {
                    Ok(user_id) => self.loader.list(&user_id).await,
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            Command::SignOut { reply } => {
                self.sign_out(true).await;
                let _ = reply.send(());
            }
        }
    }

    fn user_id(&self) -> Result<String, SessionError> {
        self.user
            .as_ref()
            .map(|u| u.user_id.clone())
            .ok_or(SessionError::NotSignedIn)
    }

    /// Fetches a conversation of the signed-in user. Conversations of other
    /// users are reported as missing.
    async fn owned_conversation(&self, conversation_id: &str) -> Result<Conversation, SessionError> {
        let user_id = self.user_id()?;
        match self.loader.get(conversation_id).await? {
            Some(conversation) if conversation.user_id == user_id => Ok(conversation),
            _ => Err(SessionError::NoConversation(conversation_id.to_string())),
        }
    }

    fn reject_if_busy(&self) -> Result<(), SessionError> {
        if self.state == ControllerState::Idle {
            return Ok(());
        }
        debug!(state = ?self.state, "rejecting command while a request is in flight");
        self.notify(Notice::Rejected(SessionError::Busy));
        Err(SessionError::Busy)
    }

    async fn submit(&mut self, text: String) -> Result<RequestTag, SessionError> {
        self.reject_if_busy()?;
        if text.trim().is_empty() {
            return Err(SessionError::EmptyInput);
        }
        let user_id = self.user_id()?;

        let conversation_id = match self.active.clone() {
            Some(id) => id,
            None => {
                let conversation = self.loader.create_default(&user_id).await?;
                self.active = Some(conversation.id.clone());
                self.entries.clear();
                conversation.id
            }
        };

        let mut messages: Vec<ChatMessage> = self
            .entries
            .iter()
            .filter(|entry| !entry.content.is_empty())
            .map(|entry| ChatMessage {
                role: entry.role,
                content: entry.content.clone(),
            })
            .collect();
        messages.push(ChatMessage::user(text.clone()));
        let request = ChatRequest::new(self.config.model.clone(), messages);

        let message_id = match self
            .synchronizer
            .persist_user_message(&conversation_id, &text)
            .await
        {
            Ok(message) => Some(message.id),
            Err(e) => {
                self.notify(Notice::PersistenceFailed {
                    conversation_id: conversation_id.clone(),
                    error: e.to_string(),
                });
                None
            }
        };
        self.entries.push(ViewEntry {
            role: MessageRole::User,
            content: text,
            message_id,
        });

        self.next_seq += 1;
        let tag = RequestTag {
            conversation_id: conversation_id.clone(),
            seq: self.next_seq,
        };
        let token = CancellationToken::new();
        self.inflight = Some(InFlight {
            tag: tag.clone(),
            token: token.clone(),
            transcript: Transcript::streaming(conversation_id.as_str()),
            decoder: StreamDecoder::new(self.config.merge_reasoning),
        });
        self.state = ControllerState::Requesting;
        self.notice = None;
        self.publish();

        info!(conversation_id = %conversation_id, seq = tag.seq, "request started");

        let guard = PumpGuard {
            tag: tag.clone(),
            events: self.pump_tx.clone(),
            end: None,
        };
        tokio::spawn(pump(self.client.clone(), request, token, guard));

        Ok(tag)
    }

    fn is_current(&self, tag: &RequestTag) -> bool {
        self.inflight.as_ref().is_some_and(|inflight| &inflight.tag == tag)
            && self.active.as_deref() == Some(tag.conversation_id.as_str())
    }

    async fn handle_pump(&mut self, event: PumpEvent) {
        match event {
            PumpEvent::Line { tag, line } => {
                if !self.is_current(&tag) {
                    debug!(conversation_id = %tag.conversation_id, seq = tag.seq, "dropping stale line");
                    return;
                }
                let Some(inflight) = self.inflight.as_mut() else {
                    return;
                };
                let step = inflight.decoder.feed_line(&line, &mut inflight.transcript);
                match step {
                    DecodeStep::Delta { visible } if !visible.is_empty() => self.publish(),
                    DecodeStep::Skipped | DecodeStep::Delta { .. } => {}
                    DecodeStep::Finished => self.complete_inflight().await,
                }
            }
            PumpEvent::End { tag, end } => {
                if self.is_current(&tag) {
                    match end {
                        PumpEnd::Closed => self.complete_inflight().await,
                        PumpEnd::Aborted => {
                            self.abort_inflight(false).await;
                            self.finish_aborting(&tag);
                        }
                        PumpEnd::Failed(error) => self.fail_inflight(error).await,
                    }
                } else {
                    self.finish_aborting(&tag);
                }
            }
        }
    }

    fn finish_aborting(&mut self, tag: &RequestTag) {
        if self.aborting.as_ref() == Some(tag) {
            self.aborting = None;
            if self.state == ControllerState::Aborting {
                self.state = ControllerState::Idle;
                self.publish();
            }
        }
    }

    async fn complete_inflight(&mut self) {
        let Some(mut inflight) = self.inflight.take() else {
            return;
        };
        inflight.token.cancel();
        inflight.transcript.complete();

        let conversation_id = inflight.tag.conversation_id.clone();
        let content = inflight.transcript.buffer().to_string();
        let message_id = match self.synchronizer.finalize(inflight.transcript).await {
            Ok(Some(message)) => {
                let id = message.id.clone();
                self.entries.push(ViewEntry::from(message));
                Some(id)
            }
            Ok(None) => None,
            Err(e) => {
                self.notify(Notice::PersistenceFailed {
                    conversation_id: conversation_id.clone(),
                    error: e.to_string(),
                });
                self.entries.push(ViewEntry {
                    role: MessageRole::Assistant,
                    content,
                    message_id: None,
                });
                None
            }
        };

        info!(conversation_id = %conversation_id, seq = inflight.tag.seq, "request completed");
        self.state = ControllerState::Idle;
        self.publish();
        self.notify(Notice::Completed {
            conversation_id,
            message_id,
        });
    }

    async fn fail_inflight(&mut self, error: SessionError) {
        let Some(mut inflight) = self.inflight.take() else {
            return;
        };
        warn!(conversation_id = %inflight.tag.conversation_id, error = %error, "request failed");
        inflight.transcript.abort();
        let _ = self.synchronizer.finalize(inflight.transcript).await;

        self.state = ControllerState::Idle;
        self.notice = Some(FAILED_NOTICE.to_string());
        self.publish();
        self.notify(Notice::Failed {
            conversation_id: inflight.tag.conversation_id,
            error: error.to_string(),
        });
    }

    /// Cancels the in-flight request and discards its buffer. The state stays
    /// `Aborting` until the pump reports its end.
    async fn abort_inflight(&mut self, explicit: bool) -> bool {
        let Some(mut inflight) = self.inflight.take() else {
            return false;
        };
        inflight.token.cancel();
        inflight.transcript.abort();
        let _ = self.synchronizer.finalize(inflight.transcript).await;

        info!(
            conversation_id = %inflight.tag.conversation_id,
            seq = inflight.tag.seq,
            explicit,
            "request aborted"
        );
        self.state = ControllerState::Aborting;
        self.aborting = Some(inflight.tag.clone());
        if explicit {
            self.notice = Some(ABORTED_NOTICE.to_string());
        }
        self.publish();
        self.notify(Notice::Aborted {
            conversation_id: inflight.tag.conversation_id,
            explicit,
        });
        true
    }

    async fn switch(&mut self, conversation_id: String) -> Result<(), SessionError> {
        self.owned_conversation(&conversation_id).await?;

        self.abort_inflight(false).await;
        self.open_conversation(Some(conversation_id)).await
    }

    /// Loads the history of `conversation_id` and makes it the visible transcript.
    async fn open_conversation(&mut self, conversation_id: Option<String>) -> Result<(), SessionError> {
        self.notice = None;
        self.active = conversation_id.clone();
        self.entries.clear();

        let result = match conversation_id {
            Some(id) => match self.loader.load_messages(&id).await {
                Ok(messages) => {
                    self.entries = messages.into_iter().map(ViewEntry::from).collect();
                    Ok(())
                }
                Err(e) => Err(e),
            },
            None => Ok(()),
        };
        self.publish();
        result
    }

    async fn new_conversation(&mut self) -> Result<Conversation, SessionError> {
        self.reject_if_busy()?;
        let user_id = self.user_id()?;
        let conversation = self.loader.create_default(&user_id).await?;
        self.open_conversation(Some(conversation.id.clone())).await?;
        Ok(conversation)
    }

    async fn delete(&mut self, conversation_id: String) -> Result<(), SessionError> {
        let user_id = self.owned_conversation(&conversation_id).await?.user_id;
        let was_active = self.active.as_deref() == Some(conversation_id.as_str());
        if was_active {
            self.abort_inflight(false).await;
        }

        self.loader.delete(&conversation_id).await?;

        if was_active {
            let next = self
                .loader
                .list(&user_id)
                .await?
                .into_iter()
                .next()
                .map(|c| c.id);
            self.open_conversation(next).await?;
        }
        Ok(())
    }

    async fn sign_out(&mut self, notify_identity: bool) {
        self.abort_inflight(false).await;
        self.user = None;
        self.active = None;
        self.entries.clear();
        self.notice = None;
        self.publish();

        if notify_identity {
            self.identity.sign_out();
        }
        info!("signed out");
        self.notify(Notice::SignedOut);
    }

    async fn handle_identity(&mut self, session: Option<UserSession>) {
        match session {
            None if self.user.is_some() => self.sign_out(false).await,
            None => {}
            Some(session) => {
                if self.user.as_ref() != Some(&session) {
                    let switched_user = self
                        .user
                        .as_ref()
                        .is_some_and(|u| u.user_id != session.user_id);
                    if switched_user {
                        self.abort_inflight(false).await;
                        self.active = None;
                        self.entries.clear();
                        self.notice = None;
                    }
                    self.user = Some(session);
                    self.publish();
                }
            }
        }
    }

    fn publish(&self) {
        let view = SessionView {
            state: self.state,
            user_id: self.user.as_ref().map(|u| u.user_id.clone()),
            active_conversation: self.active.clone(),
            entries: self.entries.clone(),
            streaming: self
                .inflight
                .as_ref()
                .map(|inflight| inflight.transcript.buffer().to_string()),
            notice: self.notice.clone(),
        };
        self.view_tx.send_replace(view);
    }

    fn notify(&self, notice: Notice) {
        let _ = self.notices.send(notice);
    }
}

/// Cloneable front end of a running [`SessionController`].
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<SessionView>,
    notices: broadcast::Sender<Notice>,
}

impl SessionHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| SessionError::ControllerGone)?;
        rx.await.map_err(|_| SessionError::ControllerGone)
    }

    pub async fn submit(&self, text: impl Into<String>) -> Result<RequestTag, SessionError> {
        let text = text.into();
        self.request(|reply| Command::Submit { text, reply }).await?
    }

    /// Returns whether a request was in flight.
    pub async fn cancel(&self) -> Result<bool, SessionError> {
        self.request(|reply| Command::Cancel { reply }).await
    }

    pub async fn switch(&self, conversation_id: impl Into<String>) -> Result<(), SessionError> {
        let conversation_id = conversation_id.into();
        self.request(|reply| Command::Switch {
            conversation_id,
            reply,
        })
        .await?
    }

    pub async fn new_conversation(&self) -> Result<Conversation, SessionError> {
        self.request(|reply| Command::NewConversation { reply })
            .await?
    }

    pub async fn rename(
        &self,
        conversation_id: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<Conversation, SessionError> {
        let conversation_id = conversation_id.into();
        let title = title.into();
        self.request(|reply| Command::Rename {
            conversation_id,
            title,
            reply,
        })
        .await?
    }

    pub async fn delete(&self, conversation_id: impl Into<String>) -> Result<(), SessionError> {
        let conversation_id = conversation_id.into();
        self.request(|reply| Command::Delete {
            conversation_id,
            reply,
        })
        .await?
    }

    pub async fn conversations(&self) -> Result<Vec<Conversation>, SessionError> {
        self.request(|reply| Command::Conversations { reply })
            .await?
    }

    pub async fn sign_out(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::SignOut { reply }).await
    }

    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    pub fn watch_view(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    pub fn notifications(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    pub async fn wait_idle(&self) -> Result<SessionView, SessionError> {
        let mut view = self.view.clone();
        let idle = view
            .wait_for(|v| v.state == ControllerState::Idle)
            .await
            .map_err(|_| SessionError::ControllerGone)?;
        Ok(idle.clone())
    }
}
