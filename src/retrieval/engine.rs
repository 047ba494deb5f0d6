//! Candidate retrieval
//!
//! Two search policies over the same [`VectorStore`]:
//! - top-k: up to `limit` rows with similarity strictly above the threshold
//! - topic-scoped: pick the single best topic (its best chunk must reach the
//!   threshold), then return that topic's chunks scored against the query
//!
//! An empty result is a valid "no match" outcome. Transport failures are
//! retried once through the [`RetryPolicy`] before surfacing.

use std::sync::Arc;

use crate::config::{RetrievalConfig, SearchPolicy};
use crate::errors::Result;
use crate::retry::RetryPolicy;
use crate::types::{by_similarity_desc, Candidate};
use crate::vector_db::{MatchRequest, VectorStore};

/// Retriever over a shared vector store
#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    policy: SearchPolicy,
    retry: RetryPolicy,
    topic_probe_count: usize,
}

impl Retriever {
    /// Create a retriever with the configured policy
    pub fn new(store: Arc<dyn VectorStore>, config: &RetrievalConfig, retry: RetryPolicy) -> Self {
        Self {
            store,
            policy: config.policy,
            retry,
            topic_probe_count: config.topic_probe_count.max(1),
        }
    }

    pub fn policy(&self) -> SearchPolicy {
        self.policy
    }

    /// Retrieve candidates ordered by similarity descending (ties: lowest id)
    pub async fn retrieve(&self, vector: &[f32], threshold: f64, limit: usize) -> Result<Vec<Candidate>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let candidates = match self.policy {
            SearchPolicy::TopK => self.top_k(vector, threshold, limit).await?,
            SearchPolicy::TopicScoped => self.topic_scoped(vector, threshold, limit).await?,
        };

        tracing::debug!(
            store = self.store.name(),
            policy = ?self.policy,
            threshold,
            limit,
            found = candidates.len(),
            "retrieval complete"
        );
        Ok(candidates)
    }

    async fn top_k(&self, vector: &[f32], threshold: f64, limit: usize) -> Result<Vec<Candidate>> {
        let request = MatchRequest {
            embedding: vector,
            threshold,
            count: limit,
        };
        let rows = self
            .retry
            .execute("match_chunks", || self.store.match_chunks(request))
            .await?;

        let mut candidates: Vec<Candidate> = rows
            .into_iter()
            .filter(|row| row.similarity > threshold)
            .collect();
        candidates.sort_by(by_similarity_desc);
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn topic_scoped(&self, vector: &[f32], threshold: f64, limit: usize) -> Result<Vec<Candidate>> {
        let request = MatchRequest {
            embedding: vector,
            threshold,
            count: self.topic_probe_count,
        };
        let probe = self
            .retry
            .execute("match_chunks", || self.store.match_chunks(request))
            .await?;

        let Some(topic) = winning_topic(&probe, threshold) else {
            tracing::debug!(threshold, probed = probe.len(), "no topic cleared the threshold");
            return Ok(Vec::new());
        };

        let rows = self
            .retry
            .execute("topic_chunks", || self.store.topic_chunks(vector, &topic))
            .await?;

        let mut candidates: Vec<Candidate> = rows.into_iter().filter(|row| row.topic == topic).collect();
        candidates.sort_by(by_similarity_desc);
        candidates.truncate(limit);

        tracing::debug!(topic = %topic, chunks = candidates.len(), "topic selected");
        Ok(candidates)
    }
}

/// Topic of the best row reaching `threshold`; highest similarity, then lowest id
pub fn winning_topic(rows: &[Candidate], threshold: f64) -> Option<String> {
    rows.iter()
        .filter(|row| row.similarity >= threshold)
        .min_by(|a, b| by_similarity_desc(a, b))
        .map(|row| row.topic.clone())
}
