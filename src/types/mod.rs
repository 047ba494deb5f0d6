//! Type definitions module
//!
//! Request-scoped data flowing through the pipeline: queries, candidates,
//! answers and stream events.

pub mod candidate;
pub mod query;
pub mod response;

// Re-export commonly used types
pub use candidate::{by_similarity_desc, Candidate, EmbeddingVector, RankedCandidate};
pub use query::{Query, ResolvedOptions};
pub use response::{
    Answer, QueryResponse, ResponseMetadata, StreamEvent, StreamFailure, StreamSummary,
    GENERIC_FAILURE, NO_MATCH_MESSAGE,
};
