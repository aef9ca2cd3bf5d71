use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, Url};
use tracing::{debug, info, warn};

use crate::cancel::{await_or_cancel, is_cancelled, CancellationSignal};
use crate::config::CompletionApiConfig;
use crate::error::{parse_error_message, CompletionApiError, IngestError};
use crate::headers::build_headers;
use crate::ingest::{ingest, IngestSummary, StreamSink};
use crate::payload::{ChatRequest, ModelList};
use crate::url::{chat_endpoint, models_endpoint};

/// HTTP client for the chat backend.
///
/// `config.timeout` bounds each whole request, body included, so a streamed
/// response that outlives it ends as an incomplete stream.
#[derive(Debug)]
pub struct CompletionClient {
    http: Client,
    config: CompletionApiConfig,
}

impl CompletionClient {
    pub fn new(config: CompletionApiConfig) -> Result<Self, CompletionApiError> {
        let endpoint = chat_endpoint(&config.base_url);
        Url::parse(&endpoint)
            .map_err(|error| CompletionApiError::InvalidBaseUrl(format!("{endpoint}: {error}")))?;

        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(CompletionApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &CompletionApiConfig {
        &self.config
    }

    pub fn chat_endpoint(&self) -> String {
        chat_endpoint(&self.config.base_url)
    }

    pub fn models_endpoint(&self) -> String {
        models_endpoint(&self.config.base_url)
    }

    pub fn build_headers(&self) -> Result<HeaderMap, CompletionApiError> {
        let mut out = HeaderMap::new();
        for (key, value) in build_headers(&self.config) {
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
                CompletionApiError::InvalidHeader {
                    name: key.clone(),
                    reason: "invalid header name",
                }
            })?;
            let value = HeaderValue::from_str(&value).map_err(|_| {
                CompletionApiError::InvalidHeader {
                    name: key.clone(),
                    reason: "invalid header value",
                }
            })?;
            out.insert(name, value);
        }
        Ok(out)
    }

    pub fn build_request(
        &self,
        request: &ChatRequest,
    ) -> Result<reqwest::RequestBuilder, CompletionApiError> {
        let headers = self.build_headers()?;
        let mut payload = request.clone();
        payload.stream = true;
        Ok(self
            .http
            .post(self.chat_endpoint())
            .headers(headers)
            .json(&payload))
    }

    /// Send the request and return the response once its status is known to
    /// be successful. Error bodies are read and summarized into the error.
    pub async fn open_stream(
        &self,
        request: &ChatRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Response, CompletionApiError> {
        if is_cancelled(cancellation) {
            return Err(CompletionApiError::Cancelled);
        }

        debug!(
            endpoint = %self.chat_endpoint(),
            model = %request.model,
            messages = request.messages.len(),
            "sending chat request"
        );
        let response = self.build_request(request)?.send();
        let response = await_or_cancel(response, cancellation)
            .await?
            .map_err(CompletionApiError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = await_or_cancel(response.text(), cancellation)
                .await?
                .unwrap_or_default();
            let message = parse_error_message(status, &body);
            return Err(CompletionApiError::Status { status, message });
        }

        if response.content_length() == Some(0) {
            return Err(CompletionApiError::MissingBody);
        }

        Ok(response)
    }

    /// Stream one chat response into `sink`.
    ///
    /// Every failure is reported through the sink exactly once, except
    /// cancellation, which is silent. The returned summary mirrors what the
    /// sink observed.
    pub async fn stream_chat<K>(
        &self,
        request: &ChatRequest,
        sink: &mut K,
        cancellation: Option<&CancellationSignal>,
    ) -> IngestSummary
    where
        K: StreamSink + ?Sized,
    {
        let response = match self.open_stream(request, cancellation).await {
            Ok(response) => response,
            Err(CompletionApiError::Cancelled) => {
                debug!("chat request cancelled before streaming");
                return IngestSummary::cancelled();
            }
            Err(error) => {
                warn!(%error, "chat request failed before streaming");
                let error = IngestError::setup(&error);
                sink.on_error(&error);
                return IngestSummary::setup_failed(error);
            }
        };

        let summary = ingest(response.bytes_stream(), sink, cancellation).await;
        info!(
            outcome = ?summary.outcome,
            content_len = summary.content.len(),
            skipped_lines = summary.skipped_lines,
            "chat response finished"
        );
        summary
    }

    /// Fetch the model identifiers the backend offers.
    pub async fn list_models(&self) -> Result<Vec<String>, CompletionApiError> {
        let mut headers = self.build_headers()?;
        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("application/json"),
        );

        let response = self
            .http
            .get(self.models_endpoint())
            .headers(headers)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let message = parse_error_message(status, &body);
            return Err(CompletionApiError::Status { status, message });
        }

        let models = serde_json::from_str::<ModelList>(&body)?.into_model_ids();
        debug!(count = models.len(), "listed models");
        Ok(models)
    }
}
