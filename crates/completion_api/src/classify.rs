//! Payload classification for decoded `data:` lines.
//!
//! Two upstream conventions are accepted for content: a flat `content` field
//! and the nested `choices[0].delta.content` shape. Classification runs an
//! ordered list of extraction rules and the first match wins, so error
//! signals always take priority over completion, and completion over content.

use serde::Deserialize;
use serde_json::Value;
use tracing::{trace, warn};

use crate::error::FrameParseError;
use crate::frame::{Frame, Metrics};

/// Terminal sentinel that carries no JSON payload.
pub const DONE_SENTINEL: &str = "[DONE]";
/// Error sentinel that carries no JSON payload.
pub const ERROR_SENTINEL: &str = "[ERROR]";

const DEFAULT_ERROR_MESSAGE: &str = "An error occurred while generating a response.";

/// Outcome of classifying one payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    Frame(Frame),
    /// Metrics without a completion signal, held for the eventual completion.
    Metrics(Metrics),
    Ignored,
}

type ExtractRule = fn(&Value) -> Option<Classified>;

const RULES: [(&str, ExtractRule); 5] = [
    ("error", extract_error),
    ("completion", extract_completion),
    ("content", extract_flat_content),
    ("choices_delta", extract_choices_delta),
    ("metrics", extract_bare_metrics),
];

/// Classify one `data:` payload. Fails only when the payload is not valid JSON.
pub fn classify_payload(payload: &str) -> Result<Classified, FrameParseError> {
    match payload {
        DONE_SENTINEL => return Ok(Classified::Frame(Frame::Completion { metrics: None })),
        ERROR_SENTINEL => {
            return Ok(Classified::Frame(Frame::Error {
                message: DEFAULT_ERROR_MESSAGE.to_owned(),
            }))
        }
        _ => {}
    }

    let value = serde_json::from_str::<Value>(payload).map_err(|source| FrameParseError {
        payload: payload.to_owned(),
        source,
    })?;

    Ok(classify_value(&value))
}

/// Run the extraction rules against an already-decoded payload.
pub fn classify_value(value: &Value) -> Classified {
    for (rule, extract) in RULES {
        if let Some(classified) = extract(value) {
            trace!(rule, "classified stream payload");
            return classified;
        }
    }

    Classified::Ignored
}

fn extract_error(value: &Value) -> Option<Classified> {
    let error = value.get("error");
    if !is_truthy(error) {
        return None;
    }

    let message = non_empty_str(value.get("content"))
        .or_else(|| match error {
            Some(Value::Object(fields)) => non_empty_str(fields.get("message")),
            other => non_empty_str(other),
        })
        .or_else(|| non_empty_str(value.get("message")))
        .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_owned());

    Some(Classified::Frame(Frame::Error { message }))
}

fn extract_completion(value: &Value) -> Option<Classified> {
    if !is_truthy(value.get("done")) {
        return None;
    }

    Some(Classified::Frame(Frame::Completion {
        metrics: decode_metrics(value),
    }))
}

fn extract_flat_content(value: &Value) -> Option<Classified> {
    let text = non_empty_str(value.get("content"))?;
    Some(Classified::Frame(Frame::ContentDelta { text }))
}

fn extract_choices_delta(value: &Value) -> Option<Classified> {
    let delta = value.get("choices")?.get(0)?.get("delta")?;
    let text = non_empty_str(delta.get("content"))?;
    Some(Classified::Frame(Frame::ContentDelta { text }))
}

fn extract_bare_metrics(value: &Value) -> Option<Classified> {
    decode_metrics(value).map(Classified::Metrics)
}

fn decode_metrics(value: &Value) -> Option<Metrics> {
    let raw = value.get("metrics").filter(|raw| raw.is_object())?;
    match Metrics::deserialize(raw) {
        Ok(metrics) => Some(metrics),
        Err(error) => {
            warn!(%error, "ignoring undecodable metrics object");
            None
        }
    }
}

/// Truthiness as the event producers define it: `false`, `0`, `""` and
/// `null` are falsy, every array and object is truthy.
fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number.as_f64().is_some_and(|number| number != 0.0),
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(str::to_owned)
}
