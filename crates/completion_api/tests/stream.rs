use std::sync::atomic::Ordering;

use completion_api::{
    ingest, new_cancellation_signal, IngestError, IngestOutcome, SinkEvent,
};
use futures_util::stream;
use pretty_assertions::assert_eq;

type Chunk = Result<Vec<u8>, String>;

fn ok(text: &str) -> Chunk {
    Ok(text.as_bytes().to_vec())
}

#[tokio::test]
async fn stream_ingest_drives_chunks_to_completion() {
    let chunks = stream::iter(vec![
        ok("data: {\"content\":\"Hel"),
        ok("lo\"}\n\ndata: {\"done\":true}\n\n"),
    ]);

    let mut events = Vec::new();
    let summary = ingest(chunks, &mut events, None).await;

    assert_eq!(
        events,
        vec![
            SinkEvent::Content("Hello".to_owned()),
            SinkEvent::Complete(None),
        ]
    );
    assert_eq!(summary.outcome, IngestOutcome::Completed);
}

#[tokio::test]
async fn stream_ingest_transport_error_is_incomplete_with_reason() {
    let chunks = stream::iter(vec![
        ok("data: {\"content\":\"Hel\"}\n"),
        Err("connection reset by peer".to_owned()),
        ok("data: {\"done\":true}\n"),
    ]);

    let mut events = Vec::new();
    let summary = ingest(chunks, &mut events, None).await;

    let error = IngestError::IncompleteStream {
        partial_content: "Hel".to_owned(),
        reason: Some("connection reset by peer".to_owned()),
    };
    assert_eq!(
        events,
        vec![
            SinkEvent::Content("Hel".to_owned()),
            SinkEvent::Error(error.clone()),
        ]
    );
    assert_eq!(summary.outcome, IngestOutcome::Incomplete);
    assert_eq!(summary.error, Some(error));
}

#[tokio::test]
async fn stream_ingest_transport_error_after_completion_stays_completed() {
    let chunks = stream::iter(vec![
        ok("data: {\"done\":true}\n"),
        Err("connection reset by peer".to_owned()),
    ]);

    let mut events = Vec::new();
    let summary = ingest(chunks, &mut events, None).await;

    assert_eq!(events, vec![SinkEvent::Complete(None)]);
    assert!(summary.is_completed());
}

#[tokio::test]
async fn stream_ingest_stops_reading_after_error_frame() {
    let chunks = stream::iter(vec![
        ok("data: {\"error\":\"overloaded\"}\n"),
        Err("never read".to_owned()),
    ]);

    let mut events = Vec::new();
    let summary = ingest(chunks, &mut events, None).await;

    assert_eq!(
        events,
        vec![SinkEvent::Error(IngestError::Stream {
            message: "overloaded".to_owned()
        })]
    );
    assert_eq!(summary.outcome, IngestOutcome::Failed);
}

#[tokio::test]
async fn stream_ingest_cancelled_before_first_chunk_emits_nothing() {
    let cancellation = new_cancellation_signal();
    cancellation.store(true, Ordering::Release);

    let chunks = stream::iter(vec![ok("data: {\"content\":\"x\"}\n")]);
    let mut events = Vec::new();
    let summary = ingest(chunks, &mut events, Some(&cancellation)).await;

    assert!(events.is_empty());
    assert_eq!(summary.outcome, IngestOutcome::Cancelled);
    assert_eq!(summary.error, None);
}

#[tokio::test]
async fn stream_ingest_cancelled_while_waiting_discards_partial_frame() {
    let cancellation = new_cancellation_signal();
    let pending_forever = stream::pending::<Chunk>();
    let chunks = futures_util::StreamExt::chain(
        stream::iter(vec![ok("data: {\"content\":\"a\"}\ndata: {\"cont")]),
        pending_forever,
    );

    let trigger = {
        let cancellation = cancellation.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            cancellation.store(true, Ordering::Release);
        })
    };

    let mut events = Vec::new();
    let summary = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        ingest(chunks, &mut events, Some(&cancellation)),
    )
    .await
    .expect("cancellation should end ingestion");
    trigger.await.expect("trigger task");

    assert_eq!(events, vec![SinkEvent::Content("a".to_owned())]);
    assert_eq!(summary.outcome, IngestOutcome::Cancelled);
    assert_eq!(summary.content, "a");
}
