use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Token usage and cost reported by the backend for one response.
///
/// Producers disagree on casing and naming, so both camelCase and snake_case
/// spellings are accepted. Each field decodes on its own: a missing, `null`
/// or mistyped value becomes zero (or `None`) without discarding the rest.
/// Counters accept integral floats such as `5.0`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    #[serde(default, alias = "prompt_tokens", deserialize_with = "lenient_count")]
    pub prompt_tokens: u64,
    #[serde(default, alias = "completion_tokens", deserialize_with = "lenient_count")]
    pub completion_tokens: u64,
    #[serde(default, alias = "total_tokens", deserialize_with = "lenient_count")]
    pub total_tokens: u64,
    #[serde(
        default,
        alias = "estimatedCost",
        alias = "estimated_cost",
        deserialize_with = "lenient_number"
    )]
    pub cost: f64,
    #[serde(
        default,
        alias = "latency",
        alias = "latency_seconds",
        deserialize_with = "lenient_optional_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub latency_seconds: Option<f64>,
}

fn finite_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|number| number.is_finite())
}

fn lenient_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if let Some(count) = value.as_u64() {
        return Ok(count);
    }
    let count = finite_number(&value)
        .filter(|number| *number >= 0.0 && number.fract() == 0.0 && *number <= u64::MAX as f64)
        .map(|number| number as u64)
        .unwrap_or(0);
    Ok(count)
}

fn lenient_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(finite_number(&value).unwrap_or(0.0))
}

fn lenient_optional_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(finite_number(&value))
}

impl Metrics {
    /// `total_tokens` when reported, otherwise the sum of the parts.
    ///
    /// Producers do not keep the total consistent with its parts, so neither
    /// value is treated as authoritative beyond this fallback.
    pub fn effective_total_tokens(&self) -> u64 {
        if self.total_tokens > 0 {
            self.total_tokens
        } else {
            self.prompt_tokens.saturating_add(self.completion_tokens)
        }
    }
}

/// One logical event extracted from the response stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Incremental assistant text.
    ContentDelta { text: String },
    /// End of the response, optionally carrying usage metrics.
    Completion {
        #[serde(skip_serializing_if = "Option::is_none")]
        metrics: Option<Metrics>,
    },
    /// The backend ended the response abnormally.
    Error { message: String },
}

impl Frame {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completion { .. } | Self::Error { .. })
    }
}
