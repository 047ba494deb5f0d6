//! Integration tests for streamed queries
//!
//! Event order, mid-stream provider failures and client cancellation.

mod common;

use common::{row, test_config, FixtureStore, Harness, ScriptedProvider};
use futures_util::StreamExt;
use ragquery::config::{SearchPolicy, DEFAULT_NO_CONTEXT_ANSWER};
use ragquery::types::{Candidate, Query, StreamEvent, StreamSummary};

fn pin_rows() -> Vec<Candidate> {
    vec![row(1, "pin", 0.69), row(2, "pin", 0.65), row(3, "pin", 0.60)]
}

fn names(events: &[StreamEvent]) -> Vec<&'static str> {
    events.iter().map(|e| e.name()).collect()
}

#[tokio::test]
async fn test_stream_event_order() {
    let harness = Harness::new(
        FixtureStore::new(pin_rows()),
        ScriptedProvider::answering(&["Open ", "Settings", "."]),
    );
    let pipeline = harness.pipeline(&test_config(SearchPolicy::TopicScoped));

    let events: Vec<StreamEvent> = pipeline
        .execute_query_stream(Query::new("How do I reset my PIN?").with_threshold(0.5))
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(
        names(&events),
        vec!["sources", "metadata", "chunk", "chunk", "chunk", "done"]
    );

    match &events[0] {
        StreamEvent::Sources(sources) => assert_eq!(sources.len(), 3),
        other => panic!("expected sources, got {:?}", other),
    }
    match &events[1] {
        StreamEvent::Metadata(metadata) => {
            assert_eq!(metadata.question, "How do I reset my PIN?");
            assert_eq!(metadata.num_sources, 3);
            assert_eq!(metadata.match_threshold, 0.5);
        }
        other => panic!("expected metadata, got {:?}", other),
    }
    assert_eq!(events[5], StreamEvent::Done(StreamSummary { chunks: 3 }));

    let stats = harness.telemetry.stats();
    assert_eq!(stats.streaming_queries, 1);
    assert_eq!(stats.fragments_streamed, 3);
    assert_eq!(stats.queries_completed, 1);
}

#[tokio::test]
async fn test_provider_disconnect_after_two_fragments() {
    let harness = Harness::new(
        FixtureStore::new(pin_rows()),
        ScriptedProvider::disconnecting_after(&["Open ", "Settings"]),
    );
    let pipeline = harness.pipeline(&test_config(SearchPolicy::TopK));

    let events: Vec<StreamEvent> = pipeline
        .execute_query_stream(Query::new("How do I reset my PIN?").with_threshold(0.5))
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(
        names(&events),
        vec!["sources", "metadata", "chunk", "chunk", "error"]
    );
    assert_eq!(events[2], StreamEvent::Chunk("Open ".to_string()));
    assert_eq!(events[3], StreamEvent::Chunk("Settings".to_string()));
    match &events[4] {
        StreamEvent::Error(failure) => assert_eq!(failure.kind, "generation_error"),
        other => panic!("expected error, got {:?}", other),
    }

    let stats = harness.telemetry.stats();
    assert_eq!(stats.queries_failed, 1);
    assert_eq!(stats.queries_completed, 0);
}

#[tokio::test]
async fn test_no_match_stream_still_answers() {
    let harness = Harness::new(FixtureStore::new(pin_rows()), ScriptedProvider::answering(&["unused"]));
    let pipeline = harness.pipeline(&test_config(SearchPolicy::TopicScoped));

    let events: Vec<StreamEvent> = pipeline
        .execute_query_stream(Query::new("How do I reset my PIN?").with_threshold(0.7))
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(names(&events), vec!["sources", "metadata", "chunk", "done"]);
    assert_eq!(events[0], StreamEvent::Sources(Vec::new()));
    assert_eq!(events[2], StreamEvent::Chunk(DEFAULT_NO_CONTEXT_ANSWER.to_string()));
    assert_eq!(harness.provider.request_count(), 0);
}

#[tokio::test]
async fn test_sources_arrive_before_provider_is_contacted() {
    let harness = Harness::new(FixtureStore::new(pin_rows()), ScriptedProvider::answering(&["a"]));
    let pipeline = harness.pipeline(&test_config(SearchPolicy::TopK));

    let mut events = pipeline
        .execute_query_stream(Query::new("PIN?").with_threshold(0.5))
        .await
        .unwrap();

    assert!(matches!(events.next().await, Some(StreamEvent::Sources(_))));
    assert!(matches!(events.next().await, Some(StreamEvent::Metadata(_))));
    assert_eq!(harness.provider.request_count(), 0);

    assert!(matches!(events.next().await, Some(StreamEvent::Chunk(_))));
    assert_eq!(harness.provider.request_count(), 1);
}

#[tokio::test]
async fn test_dropping_stream_records_cancellation() {
    let harness = Harness::new(
        FixtureStore::new(pin_rows()),
        ScriptedProvider::answering(&["one ", "two ", "three"]),
    );
    let pipeline = harness.pipeline(&test_config(SearchPolicy::TopK));

    let mut events = pipeline
        .execute_query_stream(Query::new("PIN?").with_threshold(0.5))
        .await
        .unwrap();
    for _ in 0..3 {
        events.next().await;
    }
    drop(events);

    let stats = harness.telemetry.stats();
    assert_eq!(stats.streams_cancelled, 1);
    assert_eq!(stats.queries_completed, 0);
}

#[tokio::test]
async fn test_stream_validation_and_retrieval_failures_return_envelopes() {
    let harness = Harness::new(
        FixtureStore::new(pin_rows()).failing(5),
        ScriptedProvider::answering(&["unused"]),
    );
    let pipeline = harness.pipeline(&test_config(SearchPolicy::TopK));

    let rejected = pipeline.execute_query_stream(Query::new("")).await.unwrap_err();
    assert_eq!(rejected.error.as_deref(), Some("Question cannot be empty"));

    let failed = pipeline.execute_query_stream(Query::new("PIN?")).await.unwrap_err();
    assert_eq!(failed.error_kind.as_deref(), Some("retrieval_error"));
    assert_eq!(harness.provider.request_count(), 0);
}
