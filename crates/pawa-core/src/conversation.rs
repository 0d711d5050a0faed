//! Rolling chat history of the editor panel.

use anyhow::Result;
use tracing::debug;

use crate::state::ChatMessage;
use crate::store::KeyValueStore;

/// Store key holding the persisted history.
pub const HISTORY_KEY: &str = "pawa-ai.chatHistory";

/// Most recent messages kept in the persisted copy.
pub const MAX_PERSISTED_MESSAGES: usize = 50;

/// Append-only message log. The in-memory copy is authoritative; the store
/// only ever sees its newest [`MAX_PERSISTED_MESSAGES`] entries.
#[derive(Debug, Default, Clone)]
pub struct ConversationLog {
    messages: Vec<ChatMessage>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// History sent along with a new request: everything but the newest message.
    pub fn history_before_last(&self) -> &[ChatMessage] {
        &self.messages[..self.messages.len().saturating_sub(1)]
    }

    /// Oldest first, capped to the persisted window.
    pub fn recent(&self) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(MAX_PERSISTED_MESSAGES);
        &self.messages[start..]
    }

    pub fn persist(&self, store: &mut impl KeyValueStore) -> Result<()> {
        let recent = self.recent();
        debug!(count = recent.len(), "persisting chat history");
        store.set_as(HISTORY_KEY, &recent)
    }

    pub fn clear(&mut self, store: &mut impl KeyValueStore) -> Result<()> {
        self.messages.clear();
        self.persist(store)
    }

    /// Replace the in-memory log with the stored one. A missing key leaves it empty.
    pub fn load(&mut self, store: &impl KeyValueStore) -> Result<()> {
        self.messages = store
            .get_as::<Vec<ChatMessage>>(HISTORY_KEY)?
            .unwrap_or_default();
        debug!(count = self.messages.len(), "loaded chat history");
        Ok(())
    }
}
