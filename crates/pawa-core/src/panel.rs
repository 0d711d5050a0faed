//! The editor chat panel session.
//!
//! A `ChatPanel` is created when the shell starts and dropped when it shuts
//! down. It owns the client, the history and the host, and talks to its view
//! only through [`InboundMessage`] and [`OutboundMessage`].

use anyhow::Result;
use futures_util::StreamExt;
use std::path::Path;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::actions::{run_action, ActionOutcome, CodeAction};
use crate::ai::PawaClient;
use crate::context::build_context;
use crate::conversation::ConversationLog;
use crate::error::ClientError;
use crate::events::{InboundMessage, OutboundMessage};
use crate::host::{EditorHost, NoticeLevel};
use crate::state::{ChatMessage, ChatRole};

const CONNECT_FAILED: &str = "Failed to connect to Pawa AI. Make sure the backend is running.";

pub struct ChatPanel<H: EditorHost> {
    client: PawaClient,
    host: H,
    log: ConversationLog,
    outbound: UnboundedSender<OutboundMessage>,
    busy: bool,
}

impl<H: EditorHost> ChatPanel<H> {
    /// Create the session and restore the persisted history.
    pub fn new(client: PawaClient, mut host: H, outbound: UnboundedSender<OutboundMessage>) -> Self {
        let mut log = ConversationLog::new();
        if let Err(e) = log.load(&*host.store()) {
            warn!("could not restore chat history: {e:#}");
        }

        Self {
            client,
            host,
            log,
            outbound,
            busy: false,
        }
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn client(&self) -> &PawaClient {
        &self.client
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Replay the restored history to a freshly attached view.
    pub fn replay_history(&self) {
        for msg in self.log.messages() {
            match msg.role {
                ChatRole::User => self.post(OutboundMessage::UserMessage {
                    message: msg.content.clone(),
                }),
                ChatRole::Assistant => {
                    self.post(OutboundMessage::Loading { is_loading: true });
                    self.post(OutboundMessage::AssistantChunk {
                        chunk: msg.content.clone(),
                    });
                    self.post(OutboundMessage::Loading { is_loading: false });
                }
                ChatRole::System => {}
            }
        }
    }

    /// Process view messages until the view side hangs up.
    pub async fn run(mut self, mut inbound: UnboundedReceiver<InboundMessage>) {
        while let Some(msg) = inbound.recv().await {
            let deferred = self.handle_with(msg, Some(&mut inbound)).await;
            for msg in deferred {
                self.handle(msg).await;
            }
        }
        debug!("chat panel view closed");
    }

    /// Handle one message with no concurrent inbound traffic.
    pub async fn handle(&mut self, msg: InboundMessage) {
        self.handle_with(msg, None).await;
    }

    async fn handle_with(
        &mut self,
        msg: InboundMessage,
        inbound: Option<&mut UnboundedReceiver<InboundMessage>>,
    ) -> Vec<InboundMessage> {
        match msg {
            InboundMessage::SendMessage { message } => {
                return self.send_message(&message, inbound).await;
            }
            InboundMessage::ClearHistory => {
                if let Err(e) = self.clear_history() {
                    warn!("failed to clear chat history: {e:#}");
                }
            }
            InboundMessage::ApplyCode {
                code,
                language,
                file_path,
            } => self.apply_code(&code, &language, file_path.as_deref().map(Path::new)),
            InboundMessage::RunAction { action, input } => {
                self.run_action(action, input.as_deref()).await;
            }
        }
        Vec::new()
    }

    /// Run a code action on the host. Explanations become a chat turn.
    pub async fn run_action(&mut self, action: CodeAction, input: Option<&str>) -> ActionOutcome {
        let outcome = run_action(action, &mut self.host, &self.client, input).await;
        match &outcome {
            ActionOutcome::PostToChat(message) => {
                self.send_message(message, None).await;
            }
            ActionOutcome::ClearChat => {
                if let Err(e) = self.clear_history() {
                    warn!("failed to clear chat history: {e:#}");
                }
            }
            _ => {}
        }
        outcome
    }

    /// Run one user turn. While the reply streams, further sends arriving on
    /// `inbound` are dropped and other messages are returned for later.
    async fn send_message(
        &mut self,
        text: &str,
        mut inbound: Option<&mut UnboundedReceiver<InboundMessage>>,
    ) -> Vec<InboundMessage> {
        let mut deferred = Vec::new();
        if self.busy || text.trim().is_empty() {
            return deferred;
        }
        self.busy = true;

        self.log.append(ChatMessage::user(text));
        self.post(OutboundMessage::UserMessage {
            message: text.to_string(),
        });

        let context = build_context(
            self.host.active_editor().as_ref(),
            self.host.workspace().as_ref(),
            self.client.config().auto_context_lines,
        );
        self.post(OutboundMessage::Loading { is_loading: true });

        let history = self.log.history_before_last().to_vec();
        let mut stream = match self.client.stream_chat(text, &history, &context).await {
            Ok(stream) => stream,
            Err(e) => {
                self.fail_turn(&e, true);
                return deferred;
            }
        };

        let mut full_response = String::new();
        let outcome: Result<(), ClientError> = loop {
            let item = match inbound.as_deref_mut() {
                Some(rx) => {
                    tokio::select! {
                        biased;
                        Some(msg) = rx.recv() => {
                            match msg {
                                InboundMessage::SendMessage { .. } => {
                                    debug!("reply in progress, dropping send");
                                }
                                other => deferred.push(other),
                            }
                            continue;
                        }
                        item = stream.next() => item,
                    }
                }
                None => stream.next().await,
            };

            match item {
                Some(Ok(chunk)) => {
                    full_response.push_str(&chunk);
                    self.post(OutboundMessage::AssistantChunk { chunk });
                }
                Some(Err(e)) => break Err(e),
                None => break Ok(()),
            }
        };

        match outcome {
            Ok(()) => {
                info!(chars = full_response.len(), "assistant reply complete");
                self.log.append(ChatMessage::assistant(full_response));
                if let Err(e) = self.log.persist(self.host.store()) {
                    warn!("failed to persist chat history: {e:#}");
                }
                self.post(OutboundMessage::Loading { is_loading: false });
                self.busy = false;
            }
            Err(e) => self.fail_turn(&e, false),
        }

        deferred
    }

    fn fail_turn(&mut self, error: &ClientError, before_stream: bool) {
        warn!("chat request failed: {error}");
        let text = if before_stream && error.is_unreachable() {
            CONNECT_FAILED.to_string()
        } else {
            error.to_string()
        };
        self.post(OutboundMessage::Error { error: text });
        self.post(OutboundMessage::Loading { is_loading: false });
        self.busy = false;
    }

    pub fn clear_history(&mut self) -> Result<()> {
        let result = self.log.clear(self.host.store());
        self.post(OutboundMessage::ClearChat);
        self.host.notify(NoticeLevel::Info, "Chat history cleared");
        result
    }

    /// Apply a code block from the chat.
    ///
    /// With a target file the change is shown as a diff (or written straight
    /// through when diffs are disabled). Without one the code goes in at the
    /// cursor, or into a new document when no editor is open.
    pub fn apply_code(&mut self, code: &str, language: &str, file_path: Option<&Path>) {
        let result = match file_path {
            Some(path) if self.client.config().show_diff_before_apply => {
                self.host.show_diff(path, code, "Pawa AI Changes")
            }
            Some(path) => self.host.replace_file(path, code),
            None if self.host.active_editor().is_some() => self.host.insert_at_cursor(code),
            None => self.host.open_document(language, code),
        };

        if let Err(e) = result {
            warn!("apply code failed: {e:#}");
            self.host
                .notify(NoticeLevel::Error, &format!("Failed to apply code: {e}"));
        }
    }

    fn post(&self, msg: OutboundMessage) {
        // A closed view just stops receiving updates
        let _ = self.outbound.send(msg);
    }
}
