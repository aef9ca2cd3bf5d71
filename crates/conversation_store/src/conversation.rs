use completion_api::{ChatMessage, Metrics, Role};
use time::Date;
use tracing::warn;

use crate::error::ConversationStoreError;

/// Shown in place of an assistant turn that failed before producing any text.
pub const FAILED_RESPONSE_TEXT: &str =
    "Sorry, an error occurred while processing your request. Please try again.";

/// Usage accumulated over every completed response in this process.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionTotals {
    pub tokens: u64,
    pub cost: f64,
    pub responses: u32,
}

impl SessionTotals {
    fn add(&mut self, metrics: &Metrics) {
        self.tokens = self.tokens.saturating_add(metrics.effective_total_tokens());
        self.cost += metrics.cost;
    }

    fn subtract(&mut self, metrics: &Metrics) {
        self.tokens = self.tokens.saturating_sub(metrics.effective_total_tokens());
        self.cost = (self.cost - metrics.cost).max(0.0);
    }
}

/// State changes produced by one conversation turn.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationEvent {
    UserSubmitted(String),
    /// Opens an empty assistant message that chunks are appended to.
    AssistantStarted,
    AssistantChunk(String),
    Completed(Option<Metrics>),
    /// Metrics that arrived after the completion replace the completion's.
    MetricsUpdated(Metrics),
    Failed { message: String, incomplete: bool },
    /// The caller abandoned the response. Partial text is kept; an empty
    /// placeholder is dropped.
    Cancelled,
}

#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    last_metrics: Option<Metrics>,
    totals: SessionTotals,
    error: Option<String>,
    interrupted: bool,
    streaming: bool,
}

impl Conversation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from previously persisted messages.
    #[must_use]
    pub fn from_history(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last_metrics(&self) -> Option<&Metrics> {
        self.last_metrics.as_ref()
    }

    pub fn totals(&self) -> SessionTotals {
        self.totals
    }

    /// Message of the most recent failed turn, cleared by the next submission.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether the most recent failure cut a response short.
    pub fn was_interrupted(&self) -> bool {
        self.interrupted
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// The trailing `count` messages, oldest first.
    pub fn context_window(&self, count: usize) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(count);
        &self.messages[start..]
    }

    pub fn apply(&mut self, event: ConversationEvent) {
        match event {
            ConversationEvent::UserSubmitted(text) => {
                self.error = None;
                self.interrupted = false;
                self.messages.push(ChatMessage::user(text));
            }
            ConversationEvent::AssistantStarted => {
                self.streaming = true;
                self.messages.push(ChatMessage::assistant(String::new()));
            }
            ConversationEvent::AssistantChunk(text) => match self.streaming_message() {
                Some(message) => message.content.push_str(&text),
                None => warn!("dropping assistant chunk outside of a streaming turn"),
            },
            ConversationEvent::Completed(metrics) => {
                self.streaming = false;
                self.totals.responses = self.totals.responses.saturating_add(1);
                if let Some(metrics) = &metrics {
                    self.totals.add(metrics);
                }
                self.last_metrics = metrics;
            }
            ConversationEvent::MetricsUpdated(metrics) => {
                if let Some(previous) = &self.last_metrics {
                    self.totals.subtract(previous);
                }
                self.totals.add(&metrics);
                self.last_metrics = Some(metrics);
            }
            ConversationEvent::Failed {
                message,
                incomplete,
            } => {
                if let Some(last) = self.streaming_message() {
                    if last.content.is_empty() {
                        last.content = FAILED_RESPONSE_TEXT.to_owned();
                    }
                }
                self.streaming = false;
                self.error = Some(message);
                self.interrupted = incomplete;
            }
            ConversationEvent::Cancelled => {
                let placeholder_empty = self
                    .streaming_message()
                    .is_some_and(|message| message.content.is_empty());
                if placeholder_empty {
                    self.messages.pop();
                }
                self.streaming = false;
            }
        }
    }

    /// Drop the transcript. Session totals survive.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.last_metrics = None;
        self.error = None;
        self.interrupted = false;
        self.streaming = false;
    }

    fn streaming_message(&mut self) -> Option<&mut ChatMessage> {
        if !self.streaming {
            return None;
        }
        self.messages
            .last_mut()
            .filter(|message| message.role == Role::Assistant)
    }
}

/// Pretty-printed JSON array of `{role, content}` objects.
pub fn export_json(messages: &[ChatMessage]) -> Result<String, ConversationStoreError> {
    serde_json::to_string_pretty(messages)
        .map_err(|source| ConversationStoreError::json_serialize("conversation export", source))
}

/// `chat-export-YYYY-MM-DD.json`.
#[must_use]
pub fn export_file_name(date: Date) -> String {
    format!(
        "chat-export-{:04}-{:02}-{:02}.json",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}
