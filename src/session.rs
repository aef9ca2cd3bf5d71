//! One interactive chat: settings, transcript and persistence around the
//! streaming client.

use std::fs;
use std::path::{Path, PathBuf};

use completion_api::{
    CancellationSignal, ChatMessage, ChatRequest, CompletionApiError, CompletionClient,
    IngestError, IngestOutcome, IngestSummary, Metrics, StreamSink, DEFAULT_MODEL,
};
use conversation_store::{
    export_file_name, export_json, Conversation, ConversationEvent, ConversationStoreError,
    HistoryStore, KeyValueStorage,
};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::config::{clamp_temperature, ChatConfig};
use crate::templates::PromptTemplate;

/// Messages of prior context sent with each request.
pub const CONTEXT_MESSAGES: usize = 6;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("message is empty")]
    EmptyMessage,

    #[error("unknown model '{0}'")]
    UnknownModel(String),

    #[error("no conversation to export")]
    NothingToExport,

    #[error(transparent)]
    Client(#[from] CompletionApiError),

    #[error(transparent)]
    Store(#[from] ConversationStoreError),
}

/// Applies stream callbacks to the conversation, then forwards them to the
/// caller's observer.
struct ConversationSink<'a, K: ?Sized> {
    conversation: &'a mut Conversation,
    observer: &'a mut K,
    completion_metrics: Option<Metrics>,
}

impl<K: StreamSink + ?Sized> StreamSink for ConversationSink<'_, K> {
    fn on_content_chunk(&mut self, text: &str) {
        self.conversation
            .apply(ConversationEvent::AssistantChunk(text.to_owned()));
        self.observer.on_content_chunk(text);
    }

    fn on_complete(&mut self, metrics: Option<&Metrics>) {
        self.completion_metrics = metrics.cloned();
        self.conversation
            .apply(ConversationEvent::Completed(metrics.cloned()));
        self.observer.on_complete(metrics);
    }

    fn on_error(&mut self, error: &IngestError) {
        self.conversation.apply(ConversationEvent::Failed {
            message: error.to_string(),
            incomplete: matches!(error, IngestError::IncompleteStream { .. }),
        });
        self.observer.on_error(error);
    }
}

pub struct ChatSession<S> {
    client: CompletionClient,
    conversation: Conversation,
    history: HistoryStore<S>,
    models: Vec<String>,
    model: String,
    preferred_model: Option<String>,
    temperature: f64,
    max_tokens: u32,
    template: PromptTemplate,
}

impl<S: KeyValueStorage> ChatSession<S> {
    /// Build a session and restore persisted history from `storage`.
    pub fn new(config: &ChatConfig, storage: S) -> Result<Self, SessionError> {
        let client = CompletionClient::new(config.api_config())?;
        let history = HistoryStore::new(storage);
        let conversation = Conversation::from_history(history.load());
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_owned());

        debug!(
            restored = conversation.messages().len(),
            model = %model,
            "chat session ready"
        );

        Ok(Self {
            client,
            conversation,
            history,
            models: vec![model.clone()],
            model,
            preferred_model: config.model.clone(),
            temperature: clamp_temperature(config.temperature),
            max_tokens: config.max_tokens.max(1),
            template: config.template,
        })
    }

    pub fn client(&self) -> &CompletionClient {
        &self.client
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub fn template(&self) -> PromptTemplate {
        self.template
    }

    /// Ask the backend which models it offers.
    ///
    /// When listing fails the list becomes `DEFAULT_MODEL` plus the current
    /// selection, which is left alone. Otherwise the selection is kept if
    /// listed, then the configured model, then the first listed model.
    pub async fn refresh_models(&mut self) -> &[String] {
        let listed = match self.client.list_models().await {
            Ok(models) if !models.is_empty() => models,
            Ok(_) => {
                warn!("backend listed no models; using default");
                return self.fall_back_to_default_models();
            }
            Err(error) => {
                warn!(%error, "failed to list models; using default");
                return self.fall_back_to_default_models();
            }
        };

        let keep_current = listed.iter().any(|model| *model == self.model);
        if !keep_current {
            let preferred = self
                .preferred_model
                .as_ref()
                .filter(|preferred| listed.contains(preferred));
            self.model = preferred.unwrap_or(&listed[0]).clone();
        }

        info!(count = listed.len(), selected = %self.model, "models refreshed");
        self.models = listed;
        &self.models
    }

    fn fall_back_to_default_models(&mut self) -> &[String] {
        let mut models = vec![DEFAULT_MODEL.to_owned()];
        if self.model != DEFAULT_MODEL {
            models.push(self.model.clone());
        }
        self.models = models;
        &self.models
    }

    pub fn select_model(&mut self, model: &str) -> Result<(), SessionError> {
        let model = model.trim();
        if !self.models.iter().any(|listed| listed == model) {
            return Err(SessionError::UnknownModel(model.to_owned()));
        }
        self.model = model.to_owned();
        Ok(())
    }

    /// Returns the temperature actually applied.
    pub fn set_temperature(&mut self, temperature: f64) -> f64 {
        self.temperature = clamp_temperature(temperature);
        self.temperature
    }

    /// Returns the limit actually applied.
    pub fn set_max_tokens(&mut self, max_tokens: u32) -> u32 {
        self.max_tokens = max_tokens.max(1);
        self.max_tokens
    }

    pub fn set_template(&mut self, template: PromptTemplate) {
        self.template = template;
    }

    /// The request that sending `text` now would produce: the template's
    /// system prompt, the recent context, then the templated user message.
    pub fn build_request(&self, text: &str) -> ChatRequest {
        let mut messages = Vec::with_capacity(CONTEXT_MESSAGES + 2);
        messages.push(ChatMessage::system(self.template.system_prompt()));
        messages.extend_from_slice(self.conversation.context_window(CONTEXT_MESSAGES));
        messages.push(ChatMessage::user(self.template.apply(text)));

        ChatRequest::new(self.model.clone(), messages)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
    }

    /// Send one user turn and stream the reply.
    ///
    /// Stream failures do not make this return `Err`: they are reported to
    /// `observer`, recorded on the conversation and reflected in the summary.
    /// `&mut self` keeps a session to one response at a time.
    pub async fn send_user_message<K>(
        &mut self,
        text: &str,
        observer: &mut K,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<IngestSummary, SessionError>
    where
        K: StreamSink + ?Sized,
    {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        let request = self.build_request(text);
        self.conversation
            .apply(ConversationEvent::UserSubmitted(self.template.apply(text)));
        self.conversation.apply(ConversationEvent::AssistantStarted);

        let mut sink = ConversationSink {
            conversation: &mut self.conversation,
            observer,
            completion_metrics: None,
        };
        let summary = self
            .client
            .stream_chat(&request, &mut sink, cancellation)
            .await;
        let completion_metrics = sink.completion_metrics;

        match summary.outcome {
            IngestOutcome::Cancelled => {
                self.conversation.apply(ConversationEvent::Cancelled);
            }
            IngestOutcome::Completed if summary.metrics != completion_metrics => {
                if let Some(metrics) = summary.metrics.clone() {
                    self.conversation
                        .apply(ConversationEvent::MetricsUpdated(metrics));
                }
            }
            _ => {}
        }

        self.persist_history();
        Ok(summary)
    }

    /// Drop the transcript and its persisted copy.
    pub fn clear(&mut self) -> Result<(), SessionError> {
        self.conversation.clear();
        self.history.clear()?;
        Ok(())
    }

    pub fn export_json(&self) -> Result<String, SessionError> {
        if self.conversation.messages().is_empty() {
            return Err(SessionError::NothingToExport);
        }
        Ok(export_json(self.conversation.messages())?)
    }

    /// Write the transcript to `path`, or to `chat-export-<date>.json` in
    /// `default_dir`. Returns the file written.
    pub fn export_to(
        &self,
        path: Option<&Path>,
        default_dir: &Path,
    ) -> Result<PathBuf, SessionError> {
        let json = self.export_json()?;
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => default_dir.join(export_file_name(OffsetDateTime::now_utc().date())),
        };
        fs::write(&path, json)
            .map_err(|source| ConversationStoreError::io("writing export", &path, source))?;
        info!(path = %path.display(), "conversation exported");
        Ok(path)
    }

    fn persist_history(&mut self) {
        if let Err(error) = self.history.save(self.conversation.messages()) {
            warn!(%error, "failed to persist conversation history");
        }
    }
}
