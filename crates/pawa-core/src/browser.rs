//! Standalone browser chat session.
//!
//! Non-streaming turns against `/chat`, with a server-issued conversation id,
//! staged attachments and a locally persisted conversation list.

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ai::{PawaClient, WebChatRequest};
use crate::attachments::{prefix_message, AttachmentStaging, StagingError};
use crate::render::{escape_html, render_html};
use crate::state::{ChatMessage, ChatRole};
use crate::store::KeyValueStore;

pub const CONVERSATIONS_KEY: &str = "genius_conversations";

/// Input length past which the character counter turns red.
pub const MAX_MESSAGE_LENGTH: usize = 10_000;

pub const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(30);

const TITLE_CHARS: usize = 50;

/// One saved conversation in the sidebar list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: String,
    pub title: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub messages: Vec<ChatMessage>,
}

impl ConversationRecord {
    pub fn new(id: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        let title = messages
            .first()
            .map(|m| m.content.chars().take(TITLE_CHARS).collect::<String>())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "New Chat".to_string());
        Self {
            id: id.into(),
            title,
            timestamp: Utc::now().timestamp_millis(),
            messages,
        }
    }
}

/// Conversation list kept as one JSON array, newest first.
pub struct ConversationStore<S> {
    store: S,
}

impl<S: KeyValueStore> ConversationStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn list(&self) -> Result<Vec<ConversationRecord>> {
        Ok(self
            .store
            .get_as::<Vec<ConversationRecord>>(CONVERSATIONS_KEY)?
            .unwrap_or_default())
    }

    pub fn get(&self, id: &str) -> Result<Option<ConversationRecord>> {
        Ok(self.list()?.into_iter().find(|r| r.id == id))
    }

    /// Insert or replace the record with the same id, moving it to the front.
    pub fn upsert(&mut self, record: ConversationRecord) -> Result<()> {
        let mut records = self.list()?;
        records.retain(|r| r.id != record.id);
        records.insert(0, record);
        self.store.set_as(CONVERSATIONS_KEY, &records)
    }

    pub fn remove(&mut self, id: &str) -> Result<()> {
        let mut records = self.list()?;
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() != before {
            self.store.set_as(CONVERSATIONS_KEY, &records)?;
        }
        Ok(())
    }
}

/// Running totals shown in the sidebar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionStats {
    pub messages: u32,
    pub average_response_secs: f64,
}

impl Default for SessionStats {
    fn default() -> Self {
        Self {
            messages: 0,
            average_response_secs: 2.0,
        }
    }
}

impl SessionStats {
    pub fn record(&mut self, response_secs: f64) {
        self.messages += 1;
        let n = f64::from(self.messages);
        self.average_response_secs = (self.average_response_secs * (n - 1.0) + response_secs) / n;
    }

    pub fn average_label(&self) -> String {
        format!("~{:.1}s", self.average_response_secs)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Nothing to send, or a turn was already in flight.
    Ignored,
    Replied,
    /// The request failed; an error reply was added to the transcript.
    Failed(String),
}

pub struct BrowserSession<S> {
    client: PawaClient,
    conversation_id: Option<String>,
    // Record key used until the server issues an id
    local_id: String,
    messages: Vec<ChatMessage>,
    staging: AttachmentStaging,
    busy: bool,
    stats: SessionStats,
    conversations: ConversationStore<S>,
}

impl<S: KeyValueStore> BrowserSession<S> {
    pub fn new(client: PawaClient, store: S) -> Self {
        Self {
            client,
            conversation_id: None,
            local_id: Uuid::new_v4().to_string(),
            messages: Vec::new(),
            staging: AttachmentStaging::new(),
            busy: false,
            stats: SessionStats::default(),
            conversations: ConversationStore::new(store),
        }
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn staging(&self) -> &AttachmentStaging {
        &self.staging
    }

    pub fn staging_mut(&mut self) -> &mut AttachmentStaging {
        &mut self.staging
    }

    pub fn stage_paths<P: AsRef<Path>>(&mut self, paths: &[P]) -> Vec<StagingError> {
        self.staging.stage_paths(paths)
    }

    pub fn conversations(&self) -> &ConversationStore<S> {
        &self.conversations
    }

    /// Send one turn with whatever is staged.
    pub async fn send(&mut self, text: &str) -> Result<SendOutcome> {
        let text = text.trim();
        if (text.is_empty() && self.staging.is_empty()) || self.busy {
            return Ok(SendOutcome::Ignored);
        }

        let attachments = self.staging.take();
        let outgoing = prefix_message(text, &attachments);
        self.messages
            .push(ChatMessage::user(text).with_attachments(attachments));

        self.busy = true;
        let started = Instant::now();
        let request = WebChatRequest::new(outgoing, self.conversation_id.clone());
        let result = self.client.web_chat(&request).await;
        self.busy = false;

        let outcome = match result {
            Ok(reply) => {
                if let Some(id) = reply.conversation_id {
                    self.adopt_conversation_id(id)?;
                }
                self.messages
                    .push(ChatMessage::assistant(reply.response).with_metadata(reply.metadata));
                self.stats.record(started.elapsed().as_secs_f64());
                debug!(conversation = ?self.conversation_id, "web chat turn complete");
                SendOutcome::Replied
            }
            Err(e) => {
                warn!("web chat failed: {e}");
                let error = e.to_string();
                self.messages.push(ChatMessage::assistant(format!(
                    "❌ **Error**: {error}\n\nPlease ensure the backend server is running at {}",
                    self.client.config().base_url()
                )));
                SendOutcome::Failed(error)
            }
        };

        self.save()?;
        Ok(outcome)
    }

    fn adopt_conversation_id(&mut self, id: String) -> Result<()> {
        if self.conversation_id.as_deref() == Some(id.as_str()) {
            return Ok(());
        }
        // Drop the record filed under the previous key
        self.conversations.remove(&self.record_id())?;
        self.conversation_id = Some(id);
        Ok(())
    }

    fn record_id(&self) -> String {
        self.conversation_id
            .clone()
            .unwrap_or_else(|| self.local_id.clone())
    }

    /// Persist the current conversation. Empty conversations are not stored.
    pub fn save(&mut self) -> Result<()> {
        if self.messages.is_empty() {
            return Ok(());
        }
        let record = ConversationRecord::new(self.record_id(), self.messages.clone());
        self.conversations.upsert(record)
    }

    pub fn start_new_chat(&mut self) -> Result<()> {
        self.save()?;
        self.conversation_id = None;
        self.local_id = Uuid::new_v4().to_string();
        self.messages.clear();
        self.staging.clear();
        info!("started new chat");
        Ok(())
    }

    /// Switch to a saved conversation. Returns false when the id is unknown.
    pub fn load_conversation(&mut self, id: &str) -> Result<bool> {
        let Some(record) = self.conversations.get(id)? else {
            return Ok(false);
        };
        self.conversation_id = Some(record.id.clone());
        self.local_id = record.id;
        self.messages = record.messages;
        self.staging.clear();
        Ok(true)
    }
}

/// Character count of the input and whether it is past the limit.
pub fn char_count(input: &str) -> (usize, bool) {
    let len = input.chars().count();
    (len, len > MAX_MESSAGE_LENGTH)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendStatus {
    Unknown,
    Online,
    Offline,
}

impl BackendStatus {
    pub fn label(&self) -> &'static str {
        match self {
            BackendStatus::Unknown => "Connecting...",
            BackendStatus::Online => "Connected to Intelligent AI Server",
            BackendStatus::Offline => "Disconnected - Attempting to reconnect...",
        }
    }
}

/// Background `/health` poller. The task stops when the monitor is dropped.
pub struct HealthMonitor {
    status: watch::Receiver<BackendStatus>,
    handle: JoinHandle<()>,
}

impl HealthMonitor {
    pub fn spawn(client: PawaClient, interval: Duration) -> Self {
        let (tx, status) = watch::channel(BackendStatus::Unknown);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let next = if client.health().await {
                    BackendStatus::Online
                } else {
                    BackendStatus::Offline
                };
                tx.send_if_modified(|current| {
                    if *current == next {
                        return false;
                    }
                    match next {
                        BackendStatus::Offline => warn!("backend unreachable"),
                        _ => info!("backend online"),
                    }
                    *current = next;
                    true
                });
            }
        });
        Self { status, handle }
    }

    pub fn status(&self) -> BackendStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<BackendStatus> {
        self.status.clone()
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Relative age of a message: `Just now`, `5m ago`, `3h ago`, else local `HH:MM`.
pub fn format_time(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now.signed_duration_since(timestamp);
    if age.num_seconds() < 60 {
        "Just now".to_string()
    } else if age.num_minutes() < 60 {
        format!("{}m ago", age.num_minutes())
    } else if age.num_hours() < 24 {
        format!("{}h ago", age.num_hours())
    } else {
        timestamp.with_timezone(&Local).format("%H:%M").to_string()
    }
}

/// Full message element: header, attachment media, rendered body and the
/// agent metadata badge.
pub fn render_message_html(message: &ChatMessage, now: DateTime<Utc>) -> String {
    let (class, author) = match message.role {
        ChatRole::User => ("user-message", "You"),
        _ => ("assistant-message", "Pawa AI"),
    };
    let time = message
        .timestamp
        .map(|t| format_time(t, now))
        .unwrap_or_default();

    let mut body: String = message.attachments.iter().map(|a| a.media_html()).collect();
    body.push_str(&render_html(&message.content));
    if let Some(metadata) = &message.metadata {
        body.push_str(&metadata_badge(metadata));
    }

    format!(
        r#"<div class="message {class}"><div class="message-content"><div class="message-header"><span class="message-author">{author}</span><span class="message-time">{time}</span></div><div class="message-body">{body}</div></div></div>"#
    )
}

fn metadata_badge(metadata: &Value) -> String {
    let agents = metadata
        .get("agents_used")
        .and_then(Value::as_array)
        .map(|agents| {
            agents
                .iter()
                .map(|a| a.as_str().map(str::to_string).unwrap_or_else(|| a.to_string()))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_else(|| "N/A".to_string());
    let mode = metadata
        .get("mode")
        .and_then(Value::as_str)
        .unwrap_or("standard");

    format!(
        r#"<div class="metadata-badge"><strong>🧠 Agent Analysis:</strong><br>Agents used: {}<br>Mode: {}</div>"#,
        escape_html(&agents),
        escape_html(mode)
    )
}

/// Sidebar list. Items carry their id in `data-conversation`.
pub fn render_conversation_list(records: &[ConversationRecord], active: Option<&str>) -> String {
    records
        .iter()
        .map(|record| {
            let active_class = if Some(record.id.as_str()) == active {
                " active"
            } else {
                ""
            };
            let date = DateTime::<Utc>::from_timestamp_millis(record.timestamp)
                .map(|d| d.with_timezone(&Local).format("%Y-%m-%d").to_string())
                .unwrap_or_default();
            format!(
                r#"<div class="conversation-item{active_class}" data-action="load-conversation" data-conversation="{}"><div class="conversation-title">{}</div><div class="conversation-date">{date}</div></div>"#,
                escape_html(&record.id),
                escape_html(&record.title)
            )
        })
        .collect()
}
