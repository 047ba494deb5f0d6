use async_trait::async_trait;

use crate::reranking::Reranker;
use crate::types::{Candidate, RankedCandidate};

/// Pass-through transform used when reranking is disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityReranker;

impl IdentityReranker {
    /// Keep retrieval order, score = similarity, truncate to `keep_n`
    pub fn pass_through(candidates: Vec<Candidate>, keep_n: usize) -> Vec<RankedCandidate> {
        candidates
            .into_iter()
            .take(keep_n)
            .enumerate()
            .map(|(position, candidate)| RankedCandidate::from_retrieval(candidate, position + 1))
            .collect()
    }
}

#[async_trait]
impl Reranker for IdentityReranker {
    async fn rerank(&self, _query: &str, candidates: Vec<Candidate>, keep_n: usize) -> Vec<RankedCandidate> {
        Self::pass_through(candidates, keep_n)
    }

    fn name(&self) -> &str {
        "identity"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(similarities: &[f64]) -> Vec<Candidate> {
        similarities
            .iter()
            .enumerate()
            .map(|(i, similarity)| Candidate {
                id: i as i64 + 1,
                content: format!("doc {}", i + 1),
                topic: "PIN".to_string(),
                chunk_id: i as i64,
                similarity: *similarity,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_identity_preserves_order_and_scores() {
        let ranked = IdentityReranker
            .rerank("q", candidates(&[0.69, 0.65, 0.60]), 5)
            .await;

        let scores: Vec<f64> = ranked.iter().map(|c| c.relevance_score).collect();
        assert_eq!(scores, vec![0.69, 0.65, 0.60]);
        let ranks: Vec<usize> = ranked.iter().map(|c| c.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_identity_truncates() {
        let ranked = IdentityReranker.rerank("q", candidates(&[0.9, 0.8, 0.7]), 2).await;
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[1].id(), 2);
    }
}
