//! Candidate reranking
//!
//! The rerank stage is a uniform candidate transform with two
//! implementations chosen at construction time:
//! - [`ModelReranker`]: scores each (query, content) pair with a
//!   [`RelevanceScorer`] and reorders by that score
//! - [`IdentityReranker`]: keeps retrieval order, relevance = similarity
//!
//! Output is sorted by `relevance_score` descending, ties broken by the
//! original retrieval rank, and holds at most `min(keep_n, input)` entries.
//! Reranking never fails: scoring errors degrade to identity ordering.

pub mod cross_encoder;
pub mod http;
pub mod identity;
pub mod scorer;

use async_trait::async_trait;

use crate::types::{Candidate, RankedCandidate};

pub use cross_encoder::CrossEncoderScorer;
pub use http::HttpRerankScorer;
pub use identity::IdentityReranker;
pub use scorer::{ModelReranker, RelevanceScorer};

/// Candidate transform applied between retrieval and context assembly
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Reorder and truncate candidates (given in retrieval order)
    async fn rerank(&self, query: &str, candidates: Vec<Candidate>, keep_n: usize) -> Vec<RankedCandidate>;

    /// Name reported in response metadata
    fn name(&self) -> &str;

    /// Rerank and report whose ordering was applied
    ///
    /// Same as [`Reranker::rerank`] unless scoring degraded to retrieval order,
    /// in which case `ranked_by` is `"identity"`.
    async fn apply(&self, query: &str, candidates: Vec<Candidate>, keep_n: usize) -> Reranking {
        Reranking {
            ranked: self.rerank(query, candidates, keep_n).await,
            ranked_by: self.name().to_string(),
        }
    }
}

/// Output of one rerank pass
#[derive(Debug, Clone, PartialEq)]
pub struct Reranking {
    pub ranked: Vec<RankedCandidate>,
    pub ranked_by: String,
}

/// Sort by relevance descending (ties: retrieval rank), assign ranks, truncate
pub fn finalize_ranking(mut ranked: Vec<RankedCandidate>, keep_n: usize) -> Vec<RankedCandidate> {
    ranked.sort_by(|a, b| {
        b.relevance_score
            .total_cmp(&a.relevance_score)
            .then_with(|| a.retrieval_rank.cmp(&b.retrieval_rank))
    });
    ranked.truncate(keep_n);

    for (position, candidate) in ranked.iter_mut().enumerate() {
        candidate.rank = position + 1;
    }
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(id: i64, retrieval_rank: usize, relevance_score: f64) -> RankedCandidate {
        RankedCandidate {
            candidate: Candidate {
                id,
                content: String::new(),
                topic: String::new(),
                chunk_id: 0,
                similarity: 0.5,
            },
            relevance_score,
            rank: 0,
            retrieval_rank,
        }
    }

    #[test]
    fn test_finalize_orders_and_ranks() {
        let ranked = finalize_ranking(
            vec![scored(1, 1, 0.2), scored(2, 2, 0.9), scored(3, 3, 0.9), scored(4, 4, 0.5)],
            3,
        );

        let ids: Vec<i64> = ranked.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec![2, 3, 4]);
        let ranks: Vec<usize> = ranked.iter().map(|c| c.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn test_finalize_keep_larger_than_input() {
        let ranked = finalize_ranking(vec![scored(1, 1, 0.2)], 10);
        assert_eq!(ranked.len(), 1);
    }
}
