use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Framing applied to every request: a system prompt plus an optional prefix
/// prepended to the user's text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PromptTemplate {
    #[default]
    General,
    Explain,
    Summarize,
}

impl PromptTemplate {
    pub const ALL: [PromptTemplate; 3] = [Self::General, Self::Explain, Self::Summarize];

    pub fn name(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Explain => "explain",
            Self::Summarize => "summarize",
        }
    }

    pub fn system_prompt(self) -> &'static str {
        match self {
            Self::General => {
                "You are a helpful AI assistant. Provide accurate and concise answers."
            }
            Self::Explain => {
                "You are a helpful AI assistant that explains complex concepts in simple terms \
                 that a 5-year-old could understand. Use simple words, short sentences, and \
                 relatable examples."
            }
            Self::Summarize => {
                "You are a helpful AI assistant that summarizes text. Create concise summaries \
                 that capture the main points while being significantly shorter than the \
                 original text."
            }
        }
    }

    pub fn user_prefix(self) -> Option<&'static str> {
        match self {
            Self::General => None,
            Self::Explain => Some("Explain this in simple terms as if I'm 5 years old: "),
            Self::Summarize => Some("Summarize the following text concisely: "),
        }
    }

    /// The user's text as it is sent and stored.
    pub fn apply(self, text: &str) -> String {
        match self.user_prefix() {
            Some(prefix) => format!("{prefix}{text}"),
            None => text.to_owned(),
        }
    }
}

impl fmt::Display for PromptTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown template '{0}' (expected general, explain or summarize)")]
pub struct UnknownTemplate(pub String);

impl FromStr for PromptTemplate {
    type Err = UnknownTemplate;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "general" => Ok(Self::General),
            "explain" | "eli5" => Ok(Self::Explain),
            "summarize" | "summary" => Ok(Self::Summarize),
            _ => Err(UnknownTemplate(value.trim().to_owned())),
        }
    }
}
