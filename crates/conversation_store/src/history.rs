use completion_api::ChatMessage;
use tracing::{debug, warn};

use crate::error::ConversationStoreError;
use crate::storage::KeyValueStorage;

/// Fixed key the conversation history is stored under.
pub const HISTORY_STORAGE_KEY: &str = "chat-conversation";
/// Number of trailing messages kept in storage.
pub const HISTORY_WINDOW: usize = 8;

/// Persists the trailing window of a conversation as a JSON array of
/// `{role, content}` objects.
#[derive(Debug)]
pub struct HistoryStore<S> {
    storage: S,
}

impl<S: KeyValueStorage> HistoryStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Stored history, or an empty one when nothing usable is stored.
    pub fn load(&self) -> Vec<ChatMessage> {
        match self.try_load() {
            Ok(messages) => messages,
            Err(error) => {
                warn!(%error, "discarding unreadable conversation history");
                Vec::new()
            }
        }
    }

    pub fn try_load(&self) -> Result<Vec<ChatMessage>, ConversationStoreError> {
        let Some(raw) = self.storage.get(HISTORY_STORAGE_KEY)? else {
            return Ok(Vec::new());
        };

        let mut messages = serde_json::from_str::<Vec<ChatMessage>>(&raw)
            .map_err(|source| ConversationStoreError::json_parse(HISTORY_STORAGE_KEY, source))?;
        let excess = messages.len().saturating_sub(HISTORY_WINDOW);
        messages.drain(..excess);

        debug!(count = messages.len(), "loaded conversation history");
        Ok(messages)
    }

    /// Store the last [`HISTORY_WINDOW`] entries of `messages`.
    pub fn save(&mut self, messages: &[ChatMessage]) -> Result<(), ConversationStoreError> {
        let start = messages.len().saturating_sub(HISTORY_WINDOW);
        let raw = serde_json::to_string(&messages[start..])
            .map_err(|source| ConversationStoreError::json_serialize("history", source))?;
        self.storage.set(HISTORY_STORAGE_KEY, &raw)
    }

    pub fn clear(&mut self) -> Result<(), ConversationStoreError> {
        self.storage.remove(HISTORY_STORAGE_KEY)
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }
}
