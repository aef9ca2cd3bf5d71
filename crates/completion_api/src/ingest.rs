//! Turns a chunked response body into ordered sink callbacks.
//!
//! [`StreamIngestor`] is the synchronous state machine: feed it raw chunks
//! and it decodes, frames, classifies and dispatches. [`ingest`] drives it
//! from any byte stream and handles cancellation and transport failures.

use std::fmt::Display;
use std::ops::ControlFlow;
use std::pin::pin;

use futures_util::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::cancel::{await_or_cancel, CancellationSignal};
use crate::classify::{classify_payload, Classified};
use crate::error::IngestError;
use crate::frame::{Frame, Metrics};
use crate::sse::SseStreamParser;

/// Receiver for the frames of one response.
///
/// Callbacks arrive in stream order. `on_complete` and `on_error` are each
/// called at most once, never both, and no content follows either of them.
pub trait StreamSink {
    fn on_content_chunk(&mut self, text: &str);
    fn on_complete(&mut self, metrics: Option<&Metrics>);
    fn on_error(&mut self, error: &IngestError);
}

impl<K: StreamSink + ?Sized> StreamSink for &mut K {
    fn on_content_chunk(&mut self, text: &str) {
        (**self).on_content_chunk(text);
    }

    fn on_complete(&mut self, metrics: Option<&Metrics>) {
        (**self).on_complete(metrics);
    }

    fn on_error(&mut self, error: &IngestError) {
        (**self).on_error(error);
    }
}

/// A sink callback, as recorded by the `Vec<SinkEvent>` sink.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Content(String),
    Complete(Option<Metrics>),
    Error(IngestError),
}

impl StreamSink for Vec<SinkEvent> {
    fn on_content_chunk(&mut self, text: &str) {
        self.push(SinkEvent::Content(text.to_owned()));
    }

    fn on_complete(&mut self, metrics: Option<&Metrics>) {
        self.push(SinkEvent::Complete(metrics.cloned()));
    }

    fn on_error(&mut self, error: &IngestError) {
        self.push(SinkEvent::Error(error.clone()));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A completion frame arrived.
    Completed,
    /// The backend sent an error frame.
    Failed,
    /// The body ended, or the transport broke, before any terminal frame.
    Incomplete,
    /// The request never produced a stream.
    SetupFailed,
    /// The caller cancelled; no terminal callback was made.
    Cancelled,
}

/// Final state of one ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestSummary {
    /// In-order concatenation of every dispatched content delta.
    pub content: String,
    /// Completion metrics, replaced by any metrics frame that followed.
    pub metrics: Option<Metrics>,
    pub outcome: IngestOutcome,
    /// The error reported to the sink, if any.
    pub error: Option<IngestError>,
    /// `data:` lines dropped because their payload was not valid JSON.
    pub skipped_lines: usize,
}

impl IngestSummary {
    pub fn setup_failed(error: IngestError) -> Self {
        Self {
            content: String::new(),
            metrics: None,
            outcome: IngestOutcome::SetupFailed,
            error: Some(error),
            skipped_lines: 0,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            content: String::new(),
            metrics: None,
            outcome: IngestOutcome::Cancelled,
            error: None,
            skipped_lines: 0,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.outcome == IngestOutcome::Completed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IngestState {
    Streaming,
    Completed,
    Failed,
}

/// Incremental state machine for one response body.
#[derive(Debug)]
pub struct StreamIngestor {
    parser: SseStreamParser,
    state: IngestState,
    content: String,
    pending_metrics: Option<Metrics>,
    metrics: Option<Metrics>,
    error: Option<IngestError>,
    skipped_lines: usize,
}

impl Default for StreamIngestor {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamIngestor {
    pub fn new() -> Self {
        Self {
            parser: SseStreamParser::default(),
            state: IngestState::Streaming,
            content: String::new(),
            pending_metrics: None,
            metrics: None,
            error: None,
            skipped_lines: 0,
        }
    }

    /// Content dispatched so far.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_terminated(&self) -> bool {
        self.state != IngestState::Streaming
    }

    /// Process one body chunk. Breaks once an error frame has been
    /// dispatched; the caller should stop reading and call [`Self::finish`].
    pub fn feed<K>(&mut self, chunk: &[u8], sink: &mut K) -> ControlFlow<()>
    where
        K: StreamSink + ?Sized,
    {
        if self.state == IngestState::Failed {
            return ControlFlow::Break(());
        }

        let payloads = self.parser.feed(chunk);
        self.dispatch_all(payloads, sink)
    }

    /// End of data. Classifies an unterminated final line, then reports
    /// `IncompleteStream` if no terminal frame was seen. `reason` describes
    /// a transport failure that cut the body short.
    pub fn finish<K>(mut self, reason: Option<String>, sink: &mut K) -> IngestSummary
    where
        K: StreamSink + ?Sized,
    {
        if self.state != IngestState::Failed {
            let payloads = self.parser.finish();
            let _ = self.dispatch_all(payloads, sink);
        }

        let outcome = match self.state {
            IngestState::Completed => IngestOutcome::Completed,
            IngestState::Failed => IngestOutcome::Failed,
            IngestState::Streaming => {
                let error = IngestError::IncompleteStream {
                    partial_content: self.content.clone(),
                    reason,
                };
                warn!(
                    partial_len = self.content.len(),
                    %error,
                    "stream ended without a terminal frame"
                );
                sink.on_error(&error);
                self.error = Some(error);
                IngestOutcome::Incomplete
            }
        };

        self.into_summary(outcome)
    }

    /// Abandon the response. Buffered partial data is dropped and the sink
    /// is not called.
    pub fn cancel(mut self) -> IngestSummary {
        self.parser.discard();
        debug!(content_len = self.content.len(), "stream ingestion cancelled");
        self.into_summary(IngestOutcome::Cancelled)
    }

    fn into_summary(self, outcome: IngestOutcome) -> IngestSummary {
        IngestSummary {
            content: self.content,
            metrics: self.metrics,
            outcome,
            error: self.error,
            skipped_lines: self.skipped_lines,
        }
    }

    fn dispatch_all<K>(&mut self, payloads: Vec<String>, sink: &mut K) -> ControlFlow<()>
    where
        K: StreamSink + ?Sized,
    {
        for payload in payloads {
            if self.dispatch(&payload, sink).is_break() {
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn dispatch<K>(&mut self, payload: &str, sink: &mut K) -> ControlFlow<()>
    where
        K: StreamSink + ?Sized,
    {
        let classified = match classify_payload(payload) {
            Ok(classified) => classified,
            Err(error) => {
                warn!(%error, "skipping malformed stream line");
                self.skipped_lines += 1;
                return ControlFlow::Continue(());
            }
        };

        match (self.state, classified) {
            (IngestState::Failed, _) => ControlFlow::Break(()),
            (IngestState::Streaming, Classified::Frame(Frame::ContentDelta { text })) => {
                self.content.push_str(&text);
                sink.on_content_chunk(&text);
                ControlFlow::Continue(())
            }
            (IngestState::Streaming, Classified::Frame(Frame::Completion { metrics })) => {
                let metrics = metrics.or_else(|| self.pending_metrics.take());
                debug!(
                    content_len = self.content.len(),
                    has_metrics = metrics.is_some(),
                    "stream completed"
                );
                sink.on_complete(metrics.as_ref());
                self.metrics = metrics;
                self.state = IngestState::Completed;
                ControlFlow::Continue(())
            }
            (IngestState::Streaming, Classified::Frame(Frame::Error { message })) => {
                let error = IngestError::Stream { message };
                warn!(%error, "backend reported a stream error");
                sink.on_error(&error);
                self.error = Some(error);
                self.state = IngestState::Failed;
                ControlFlow::Break(())
            }
            (IngestState::Streaming, Classified::Metrics(metrics)) => {
                self.pending_metrics = Some(metrics);
                ControlFlow::Continue(())
            }
            (IngestState::Completed, Classified::Metrics(metrics)) => {
                debug!("metrics arrived after completion");
                self.metrics = Some(metrics);
                ControlFlow::Continue(())
            }
            (IngestState::Completed, Classified::Frame(frame)) => {
                debug!(?frame, "ignoring frame after completion");
                ControlFlow::Continue(())
            }
            (_, Classified::Ignored) => {
                debug!(payload, "ignoring unrecognized stream payload");
                ControlFlow::Continue(())
            }
        }
    }
}

/// Drive a [`StreamIngestor`] from a stream of body chunks.
///
/// The stream is dropped as soon as a terminal error frame is dispatched, a
/// chunk fails, or the cancellation signal is raised.
pub async fn ingest<S, B, E, K>(
    stream: S,
    sink: &mut K,
    cancellation: Option<&CancellationSignal>,
) -> IngestSummary
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
    K: StreamSink + ?Sized,
{
    let mut stream = pin!(stream);
    let mut ingestor = StreamIngestor::new();

    loop {
        let next = match await_or_cancel(stream.next(), cancellation).await {
            Ok(next) => next,
            Err(_) => return ingestor.cancel(),
        };

        match next {
            Some(Ok(chunk)) => {
                if ingestor.feed(chunk.as_ref(), sink).is_break() {
                    return ingestor.finish(None, sink);
                }
            }
            Some(Err(error)) => {
                let reason = error.to_string();
                warn!(%reason, "stream read failed");
                return ingestor.finish(Some(reason), sink);
            }
            None => return ingestor.finish(None, sink),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn run(chunks: &[&[u8]]) -> (Vec<SinkEvent>, IngestSummary) {
        let mut events = Vec::new();
        let mut ingestor = StreamIngestor::new();
        for chunk in chunks {
            if ingestor.feed(chunk, &mut events).is_break() {
                break;
            }
        }
        let summary = ingestor.finish(None, &mut events);
        (events, summary)
    }

    #[test]
    fn error_frame_breaks_and_drops_later_frames() {
        let mut events = Vec::new();
        let mut ingestor = StreamIngestor::new();

        let flow = ingestor.feed(
            b"data: {\"error\":true,\"content\":\"boom\"}\ndata: {\"content\":\"late\"}\n",
            &mut events,
        );
        assert!(flow.is_break());
        assert!(ingestor.feed(b"data: {\"done\":true}\n", &mut events).is_break());

        let summary = ingestor.finish(None, &mut events);
        assert_eq!(summary.outcome, IngestOutcome::Failed);
        assert_eq!(
            events,
            vec![SinkEvent::Error(IngestError::Stream {
                message: "boom".to_owned()
            })]
        );
    }

    #[test]
    fn pending_metrics_attach_to_bare_done() {
        let (events, summary) = run(&[
            b"data: {\"content\":\"a\"}\n",
            b"data: {\"metrics\":{\"totalTokens\":4}}\n",
            b"data: [DONE]\n",
        ]);

        let metrics = Metrics {
            total_tokens: 4,
            ..Metrics::default()
        };
        assert_eq!(
            events,
            vec![
                SinkEvent::Content("a".to_owned()),
                SinkEvent::Complete(Some(metrics.clone())),
            ]
        );
        assert_eq!(summary.metrics, Some(metrics));
    }

    #[test]
    fn metrics_after_completion_update_summary_only() {
        let (events, summary) = run(&[
            b"data: {\"done\":true}\n",
            b"data: {\"content\":\"ignored\"}\n",
            b"data: {\"metrics\":{\"total_tokens\":7,\"cost\":0.01}}\n",
        ]);

        assert_eq!(events, vec![SinkEvent::Complete(None)]);
        assert_eq!(summary.outcome, IngestOutcome::Completed);
        assert_eq!(summary.content, "");
        assert_eq!(summary.metrics.map(|metrics| metrics.total_tokens), Some(7));
    }

    #[test]
    fn cancel_discards_without_callbacks() {
        let mut events = Vec::new();
        let mut ingestor = StreamIngestor::new();
        let _ = ingestor.feed(b"data: {\"content\":\"Hi\"}\ndata: {\"con", &mut events);

        let summary = ingestor.cancel();
        assert_eq!(summary.outcome, IngestOutcome::Cancelled);
        assert_eq!(summary.content, "Hi");
        assert_eq!(events, vec![SinkEvent::Content("Hi".to_owned())]);
    }

    #[test]
    fn unterminated_done_line_is_classified_at_end() {
        let (events, summary) = run(&[b"data: {\"content\":\"x\"}\n", b"data: {\"done\":true}"]);
        assert!(summary.is_completed());
        assert_eq!(events.last(), Some(&SinkEvent::Complete(None)));
    }
}
