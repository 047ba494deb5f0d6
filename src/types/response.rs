//! Response envelope, answers and stream events

use serde::{Deserialize, Serialize};

use crate::errors::RagError;
use crate::types::RankedCandidate;

/// Generic message returned when an unexpected failure is hidden from callers
pub const GENERIC_FAILURE: &str = "An error occurred processing your request";

/// Message attached to successful responses that had nothing to ground on
pub const NO_MATCH_MESSAGE: &str = "No matching documents found";

/// Complete answer produced by the generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    /// Model that produced the text, `None` for the no-context fallback
    pub model: Option<String>,
    /// Whether retrieved context was available
    pub grounded: bool,
}

/// Retrieval facts reported alongside every answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub request_id: String,
    pub question: String,
    pub num_sources: usize,
    pub match_threshold: f64,
    /// Candidates returned by the retriever before reranking
    pub retrieved: usize,
    /// Name of the candidate transform that ran
    pub reranker: String,
}

/// Terminal payload of a successful stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSummary {
    pub chunks: usize,
}

/// Terminal payload of a failed stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamFailure {
    pub error: String,
    pub kind: String,
}

/// One unit of a streamed response
///
/// Order within one stream is always `Sources`, `Metadata`, any number of
/// `Chunk`s, then exactly one of `Done` or `Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    Sources(Vec<RankedCandidate>),
    Metadata(ResponseMetadata),
    Chunk(String),
    Done(StreamSummary),
    Error(StreamFailure),
}

impl StreamEvent {
    /// Build the terminal error event for a failure
    pub fn failure(err: &RagError) -> Self {
        StreamEvent::Error(StreamFailure {
            error: err.to_string(),
            kind: err.kind().to_string(),
        })
    }

    /// Event name used on the wire
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Sources(_) => "sources",
            StreamEvent::Metadata(_) => "metadata",
            StreamEvent::Chunk(_) => "chunk",
            StreamEvent::Done(_) => "done",
            StreamEvent::Error(_) => "error",
        }
    }

    /// Event payload without the tag
    pub fn data(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            StreamEvent::Sources(sources) => serde_json::to_value(sources),
            StreamEvent::Metadata(metadata) => serde_json::to_value(metadata),
            StreamEvent::Chunk(text) => Ok(serde_json::Value::String(text.clone())),
            StreamEvent::Done(summary) => serde_json::to_value(summary),
            StreamEvent::Error(failure) => serde_json::to_value(failure),
        }
    }

    /// `Done` and `Error` end a stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done(_) | StreamEvent::Error(_))
    }
}

/// JSON envelope returned by the synchronous query operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<RankedCandidate>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResponseMetadata>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl QueryResponse {
    /// Successful envelope
    ///
    /// The no-match message reflects retrieval only; matches that did not fit
    /// the context budget still count as found.
    pub fn answered(answer: Answer, sources: Vec<RankedCandidate>, metadata: ResponseMetadata) -> Self {
        let message = (metadata.retrieved == 0).then(|| NO_MATCH_MESSAGE.to_string());

        Self {
            success: true,
            answer: Some(answer.text),
            sources: Some(sources),
            metadata: Some(metadata),
            message,
            error: None,
            error_kind: None,
            details: None,
        }
    }

    /// Failure envelope; internal error text only leaves when `expose_details` is set
    pub fn failure(err: &RagError, expose_details: bool) -> Self {
        let error = if err.is_client_error() {
            err.to_string()
        } else {
            GENERIC_FAILURE.to_string()
        };
        let details = (expose_details && !err.is_client_error()).then(|| err.to_string());

        Self {
            success: false,
            answer: None,
            sources: None,
            metadata: None,
            message: None,
            error: Some(error),
            error_kind: Some(err.kind().to_string()),
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> ResponseMetadata {
        ResponseMetadata {
            request_id: "req-1".to_string(),
            question: "How do I reset my PIN?".to_string(),
            num_sources: 0,
            match_threshold: 0.7,
            retrieved: 0,
            reranker: "identity".to_string(),
        }
    }

    #[test]
    fn test_empty_sources_envelope_keeps_sources_field() {
        let answer = Answer {
            text: "fallback".to_string(),
            model: None,
            grounded: false,
        };
        let response = QueryResponse::answered(answer, Vec::new(), metadata());
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["success"], true);
        assert_eq!(json["sources"], serde_json::json!([]));
        assert_eq!(json["message"], NO_MATCH_MESSAGE);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_no_match_message_follows_retrieval() {
        let answer = Answer {
            text: "fallback".to_string(),
            model: None,
            grounded: false,
        };
        let mut retrieved = metadata();
        retrieved.retrieved = 3;

        let response = QueryResponse::answered(answer, Vec::new(), retrieved);
        assert_eq!(response.sources, Some(Vec::new()));
        assert!(response.message.is_none());
    }

    #[test]
    fn test_failure_envelope_hides_internal_details() {
        let err = RagError::Retrieval("connection refused by 10.0.0.3".to_string());

        let hidden = QueryResponse::failure(&err, false);
        assert!(!hidden.success);
        assert_eq!(hidden.error.as_deref(), Some(GENERIC_FAILURE));
        assert!(hidden.details.is_none());
        assert_eq!(hidden.error_kind.as_deref(), Some("retrieval_error"));

        let exposed = QueryResponse::failure(&err, true);
        assert!(exposed.details.unwrap().contains("10.0.0.3"));
    }

    #[test]
    fn test_validation_failure_message_is_visible() {
        let err = RagError::Validation("Question cannot be empty".to_string());
        let response = QueryResponse::failure(&err, false);
        assert_eq!(response.error.as_deref(), Some("Question cannot be empty"));
        assert!(response.details.is_none());
    }

    #[test]
    fn test_stream_event_wire_shape() {
        let chunk = StreamEvent::Chunk("Hello".to_string());
        assert_eq!(chunk.name(), "chunk");
        assert_eq!(chunk.data().unwrap(), serde_json::json!("Hello"));
        assert!(!chunk.is_terminal());

        let failure = StreamEvent::failure(&RagError::Generation("provider disconnected".into()));
        assert_eq!(failure.name(), "error");
        assert!(failure.is_terminal());
        assert_eq!(failure.data().unwrap()["kind"], "generation_error");

        let tagged = serde_json::to_value(&StreamEvent::Done(StreamSummary { chunks: 2 })).unwrap();
        assert_eq!(tagged["event"], "done");
        assert_eq!(tagged["data"]["chunks"], 2);
    }
}
