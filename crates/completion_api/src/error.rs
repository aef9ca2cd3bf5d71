use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Failure outside of a streaming call: client setup, request building and
/// model listing.
#[derive(Debug, Error)]
pub enum CompletionApiError {
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: &'static str },

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("response body is empty")]
    MissingBody,

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("request was cancelled")]
    Cancelled,
}

/// Failure reported to a [`crate::StreamSink`] for one streaming request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    /// The request failed before any streaming began.
    #[error("completion request failed: {message}")]
    Setup {
        status: Option<u16>,
        message: String,
    },

    /// The backend sent an explicit error frame.
    #[error("{message}")]
    Stream { message: String },

    /// The stream closed without a completion or error frame.
    #[error("response ended unexpectedly{}", reason_suffix(.reason))]
    IncompleteStream {
        partial_content: String,
        reason: Option<String>,
    },
}

impl IngestError {
    pub fn setup(error: &CompletionApiError) -> Self {
        match error {
            CompletionApiError::Status { status, message } => Self::Setup {
                status: Some(status.as_u16()),
                message: message.clone(),
            },
            other => Self::Setup {
                status: None,
                message: other.to_string(),
            },
        }
    }

    /// Partial assistant text preserved by an incomplete stream.
    pub fn partial_content(&self) -> Option<&str> {
        match self {
            Self::IncompleteStream {
                partial_content, ..
            } => Some(partial_content),
            _ => None,
        }
    }
}

/// A single `data:` line whose payload could not be decoded.
///
/// Recovered locally: the line is skipped and the stream continues.
#[derive(Debug, Error)]
#[error("malformed frame payload {payload:?}: {source}")]
pub struct FrameParseError {
    pub payload: String,
    #[source]
    pub source: serde_json::Error,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    error: Option<Value>,
    message: Option<String>,
}

/// Summarize a non-success response body into a human-readable message.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ErrorPayload>(body) {
        let explicit = match payload.error {
            Some(Value::String(message)) => non_empty_string(&message).map(str::to_owned),
            Some(Value::Object(fields)) => fields
                .get("message")
                .and_then(Value::as_str)
                .and_then(non_empty_string)
                .map(str::to_owned),
            _ => None,
        };
        if let Some(message) = explicit.or_else(|| {
            payload
                .message
                .as_deref()
                .and_then(non_empty_string)
                .map(str::to_owned)
        }) {
            return message;
        }
    }

    if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.trim().to_string()
    }
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|reason| format!(": {reason}"))
        .unwrap_or_default()
}

fn non_empty_string(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
