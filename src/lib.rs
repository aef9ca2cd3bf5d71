//! Terminal chat client for a streaming chat-completion backend.
//!
//! The wire protocol lives in `completion_api` and persisted history in
//! `conversation_store`; this crate wires both into an interactive session.
//!
//! ## Environment
//!
//! - `CHAT_API_BASE_URL` backend origin, default `http://localhost:5002`
//! - `CHAT_API_KEY` sent as a bearer token when set
//! - `CHAT_MODEL`, `CHAT_TEMPERATURE`, `CHAT_MAX_TOKENS`, `CHAT_TEMPLATE`
//! - `CHAT_TIMEOUT_SEC` whole-request timeout
//! - `CHAT_STORAGE_DIR` history root, default `<cwd>/.chat/storage`
//! - `CHAT_LOG_LEVEL` / `CHAT_LOG_JSON` stderr logging

pub mod app;
pub mod commands;
pub mod config;
pub mod logging;
pub mod session;
pub mod templates;

pub use crate::app::{handle_command, CommandOutcome, TerminalSink};
pub use crate::commands::{parse_slash_command, SlashCommand};
pub use crate::config::ChatConfig;
pub use crate::session::{ChatSession, SessionError, CONTEXT_MESSAGES};
pub use crate::templates::PromptTemplate;
