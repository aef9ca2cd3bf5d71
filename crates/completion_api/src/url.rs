/// Default base URL of the chat backend.
pub const DEFAULT_BASE_URL: &str = "http://localhost:5002";

const CHAT_PATH: &str = "/api/chat";
const MODELS_PATH: &str = "/api/models";

/// Normalize a base URL to the streaming chat endpoint.
///
/// Normalization rules:
/// 1) blank input falls back to [`DEFAULT_BASE_URL`]
/// 2) keep `/api/chat` unchanged
/// 3) append `/chat` when path ends in `/api`
/// 4) append `/api/chat` otherwise
pub fn chat_endpoint(input: &str) -> String {
    let trimmed = trimmed_base(input);
    if trimmed.ends_with(CHAT_PATH) {
        return trimmed.to_string();
    }
    if trimmed.ends_with("/api") {
        return format!("{trimmed}/chat");
    }
    format!("{trimmed}{CHAT_PATH}")
}

/// Normalize a base URL to the model listing endpoint.
///
/// A base that already points at the chat endpoint is rewritten to its sibling.
pub fn models_endpoint(input: &str) -> String {
    let trimmed = trimmed_base(input);
    if trimmed.ends_with(MODELS_PATH) {
        return trimmed.to_string();
    }
    if let Some(root) = trimmed.strip_suffix(CHAT_PATH) {
        return format!("{root}{MODELS_PATH}");
    }
    if trimmed.ends_with("/api") {
        return format!("{trimmed}/models");
    }
    format!("{trimmed}{MODELS_PATH}")
}

fn trimmed_base(input: &str) -> &str {
    let base = if input.trim().is_empty() {
        DEFAULT_BASE_URL
    } else {
        input.trim()
    };

    base.trim_end_matches('/')
}
