//! Retrieval candidates and their ranked form

use serde::{Deserialize, Serialize};

/// Fixed-dimension embedding produced by an [`crate::embedding::Embedder`]
pub type EmbeddingVector = Vec<f32>;

/// One chunk returned by the vector store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: i64,
    pub content: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub chunk_id: i64,
    /// Cosine similarity to the query vector
    pub similarity: f64,
}

/// Candidate after the rerank stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    #[serde(flatten)]
    pub candidate: Candidate,
    pub relevance_score: f64,
    /// 1-based position after reranking
    pub rank: usize,
    /// 1-based position in the retrieval result
    pub retrieval_rank: usize,
}

impl RankedCandidate {
    /// Pass a candidate through unchanged, scored by its retrieval similarity
    pub fn from_retrieval(candidate: Candidate, retrieval_rank: usize) -> Self {
        Self {
            relevance_score: candidate.similarity,
            rank: retrieval_rank,
            retrieval_rank,
            candidate,
        }
    }

    pub fn id(&self) -> i64 {
        self.candidate.id
    }

    pub fn content(&self) -> &str {
        &self.candidate.content
    }
}

/// Order by similarity descending, ties broken by lowest id
pub fn by_similarity_desc(a: &Candidate, b: &Candidate) -> std::cmp::Ordering {
    b.similarity
        .total_cmp(&a.similarity)
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: i64, similarity: f64) -> Candidate {
        Candidate {
            id,
            content: format!("chunk {}", id),
            topic: "vpn".to_string(),
            chunk_id: id,
            similarity,
        }
    }

    #[test]
    fn test_similarity_ordering_breaks_ties_on_id() {
        let mut rows = vec![candidate(7, 0.6), candidate(3, 0.9), candidate(2, 0.6)];
        rows.sort_by(by_similarity_desc);

        let ids: Vec<i64> = rows.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![3, 2, 7]);
    }

    #[test]
    fn test_ranked_candidate_serializes_flat() {
        let ranked = RankedCandidate::from_retrieval(candidate(1, 0.8), 1);
        let json = serde_json::to_value(&ranked).unwrap();

        assert_eq!(json["id"], 1);
        assert_eq!(json["topic"], "vpn");
        assert_eq!(json["relevance_score"], 0.8);
        assert_eq!(json["rank"], 1);
    }

    #[test]
    fn test_candidate_tolerates_missing_topic() {
        let row: Candidate =
            serde_json::from_str(r#"{"id": 4, "content": "text", "similarity": 0.71}"#).unwrap();
        assert_eq!(row.topic, "");
        assert_eq!(row.chunk_id, 0);
    }
}
