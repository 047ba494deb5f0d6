//! Vector search backends
//!
//! A [`VectorStore`] is the remote collaborator behind the retriever. It only
//! moves rows; ordering, tie-breaks and the topic policy belong to
//! [`crate::retrieval::Retriever`] so every backend behaves the same.

pub mod memory;
pub mod qdrant;
pub mod supabase;

use async_trait::async_trait;

use crate::errors::Result;
use crate::types::Candidate;

pub use memory::MemoryStore;
pub use qdrant::QdrantStore;
pub use supabase::SupabaseStore;

/// Thresholded similarity search
#[derive(Debug, Clone, Copy)]
pub struct MatchRequest<'a> {
    pub embedding: &'a [f32],
    /// Rows below this similarity are not returned
    pub threshold: f64,
    /// Maximum rows returned
    pub count: usize,
}

/// Remote vector search
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Up to `count` rows scoring at or above `threshold`
    async fn match_chunks(&self, request: MatchRequest<'_>) -> Result<Vec<Candidate>>;

    /// Every chunk of `topic`, each scored against `embedding`
    async fn topic_chunks(&self, embedding: &[f32], topic: &str) -> Result<Vec<Candidate>>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}
