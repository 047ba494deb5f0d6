//! Streamed query responses

use futures_util::stream::{FusedStream, Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use crate::generation::EventStream;
use crate::telemetry::{PipelineEvent, PipelineTelemetry, Stage};
use crate::types::StreamEvent;

/// Event sequence of one streamed query
///
/// Yields `sources`, `metadata`, then chunks, and ends after exactly one
/// `done` or `error`. Not restartable. Dropping it before the terminal event
/// closes the provider connection and is recorded as a cancellation.
pub struct QueryStream {
    inner: EventStream,
    request_id: String,
    telemetry: PipelineTelemetry,
    generation_started: Instant,
    finished: bool,
}

impl QueryStream {
    pub(crate) fn new(inner: EventStream, request_id: String, telemetry: PipelineTelemetry) -> Self {
        Self {
            inner,
            request_id,
            telemetry,
            generation_started: Instant::now(),
            finished: false,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    fn observe(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Sources(_) | StreamEvent::Metadata(_) => {
                self.generation_started = Instant::now();
            }
            StreamEvent::Chunk(_) => {
                self.telemetry.record(PipelineEvent::FragmentStreamed {
                    timestamp: Instant::now(),
                });
            }
            StreamEvent::Done(summary) => {
                self.finished = true;
                self.telemetry.stage(Stage::Generate, self.generation_started);
                self.telemetry.record(PipelineEvent::QueryCompleted {
                    request_id: self.request_id.clone(),
                    timestamp: Instant::now(),
                });
                tracing::info!(request_id = %self.request_id, chunks = summary.chunks, "stream complete");
            }
            StreamEvent::Error(failure) => {
                self.finished = true;
                self.telemetry.record(PipelineEvent::QueryFailed {
                    request_id: self.request_id.clone(),
                    kind: failure.kind.clone(),
                    timestamp: Instant::now(),
                });
                tracing::warn!(
                    request_id = %self.request_id,
                    kind = %failure.kind,
                    error = %failure.error,
                    "stream ended with error"
                );
            }
        }
    }
}

impl Stream for QueryStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<StreamEvent>> {
        if self.finished {
            return Poll::Ready(None);
        }

        match self.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(event)) => {
                self.observe(&event);
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl FusedStream for QueryStream {
    fn is_terminated(&self) -> bool {
        self.finished
    }
}

impl Drop for QueryStream {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        tracing::info!(request_id = %self.request_id, "client went away, closing provider stream");
        self.telemetry.record(PipelineEvent::StreamCancelled {
            request_id: self.request_id.clone(),
            timestamp: Instant::now(),
        });
    }
}

impl std::fmt::Debug for QueryStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryStream")
            .field("request_id", &self.request_id)
            .field("finished", &self.finished)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StreamFailure, StreamSummary};
    use futures_util::stream;

    fn query_stream(events: Vec<StreamEvent>, telemetry: &PipelineTelemetry) -> QueryStream {
        QueryStream::new(stream::iter(events).boxed(), "req-1".to_string(), telemetry.clone())
    }

    #[tokio::test]
    async fn test_fuses_after_terminal_event() {
        let telemetry = PipelineTelemetry::new();
        let mut events = query_stream(
            vec![
                StreamEvent::Chunk("a".to_string()),
                StreamEvent::Done(StreamSummary { chunks: 1 }),
                StreamEvent::Chunk("late".to_string()),
            ],
            &telemetry,
        );

        assert_eq!(events.next().await, Some(StreamEvent::Chunk("a".to_string())));
        assert!(matches!(events.next().await, Some(StreamEvent::Done(_))));
        assert!(events.is_terminated());
        assert_eq!(events.next().await, None);
        drop(events);

        let stats = telemetry.stats();
        assert_eq!(stats.fragments_streamed, 1);
        assert_eq!(stats.queries_completed, 1);
        assert_eq!(stats.streams_cancelled, 0);
    }

    #[tokio::test]
    async fn test_drop_before_terminal_is_cancellation() {
        let telemetry = PipelineTelemetry::new();
        let mut events = query_stream(
            vec![
                StreamEvent::Chunk("a".to_string()),
                StreamEvent::Chunk("b".to_string()),
                StreamEvent::Done(StreamSummary { chunks: 2 }),
            ],
            &telemetry,
        );

        events.next().await;
        drop(events);

        assert_eq!(telemetry.stats().streams_cancelled, 1);
    }

    #[tokio::test]
    async fn test_error_event_counts_as_failure() {
        let telemetry = PipelineTelemetry::new();
        let events: Vec<StreamEvent> = query_stream(
            vec![StreamEvent::Error(StreamFailure {
                error: "Generation failed: reset".to_string(),
                kind: "generation_error".to_string(),
            })],
            &telemetry,
        )
        .collect()
        .await;

        assert_eq!(events.len(), 1);
        assert_eq!(telemetry.stats().queries_failed, 1);
        assert_eq!(telemetry.stats().streams_cancelled, 0);
    }
}
