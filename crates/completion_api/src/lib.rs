//! Transport and stream ingestion for a streaming chat-completion backend.
//!
//! The backend answers `POST /api/chat` with an event-stream body of `data:`
//! lines. This crate frames and classifies those lines into content deltas,
//! a completion carrying usage metrics, or an error, and dispatches them to a
//! [`StreamSink`]. It holds no conversation state and does no rendering.

pub mod cancel;
pub mod classify;
pub mod client;
pub mod config;
pub mod decoder;
pub mod error;
pub mod frame;
pub mod headers;
pub mod ingest;
pub mod payload;
pub mod sse;
pub mod url;

pub use cancel::{new_cancellation_signal, CancellationSignal};
pub use client::CompletionClient;
pub use config::CompletionApiConfig;
pub use error::{CompletionApiError, FrameParseError, IngestError};
pub use frame::{Frame, Metrics};
pub use ingest::{ingest, IngestOutcome, IngestSummary, SinkEvent, StreamIngestor, StreamSink};
pub use payload::{ChatMessage, ChatRequest, ModelList, Role, DEFAULT_MODEL};
pub use sse::SseStreamParser;
pub use url::{chat_endpoint, models_endpoint, DEFAULT_BASE_URL};
