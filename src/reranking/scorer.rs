//! Model-backed reranking

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

use crate::errors::{RagError, Result};
use crate::reranking::{finalize_ranking, IdentityReranker, Reranker, Reranking};
use crate::telemetry::{PipelineEvent, PipelineTelemetry};
use crate::types::{Candidate, RankedCandidate};

/// Binary relevance classifier over (query, document) pairs
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    /// One probability-like score per document, in input order
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f64>>;

    fn model_id(&self) -> &str;
}

/// Reranker that reorders candidates by a relevance model's scores
pub struct ModelReranker {
    scorer: Arc<dyn RelevanceScorer>,
    batch_size: usize,
    telemetry: Option<PipelineTelemetry>,
}

impl ModelReranker {
    pub fn new(scorer: Arc<dyn RelevanceScorer>, batch_size: usize) -> Self {
        Self {
            scorer,
            batch_size: batch_size.max(1),
            telemetry: None,
        }
    }

    /// Record fallbacks in a telemetry collector
    pub fn with_telemetry(mut self, telemetry: PipelineTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Score every candidate, batch by batch
    async fn score_all(&self, query: &str, candidates: &[Candidate]) -> Result<Vec<f64>> {
        let documents: Vec<String> = candidates.iter().map(|c| c.content.clone()).collect();
        let mut scores = Vec::with_capacity(documents.len());

        for batch in documents.chunks(self.batch_size) {
            let batch_scores = self.scorer.score(query, batch).await?;
            if batch_scores.len() != batch.len() {
                return Err(RagError::Rerank(format!(
                    "expected {} scores, scorer returned {}",
                    batch.len(),
                    batch_scores.len()
                )));
            }
            if let Some(bad) = batch_scores.iter().find(|s| !s.is_finite()) {
                return Err(RagError::Rerank(format!("non-finite relevance score {}", bad)));
            }
            scores.extend(batch_scores);
        }

        Ok(scores)
    }
}

#[async_trait]
impl Reranker for ModelReranker {
    async fn rerank(&self, query: &str, candidates: Vec<Candidate>, keep_n: usize) -> Vec<RankedCandidate> {
        self.apply(query, candidates, keep_n).await.ranked
    }

    async fn apply(&self, query: &str, candidates: Vec<Candidate>, keep_n: usize) -> Reranking {
        if candidates.is_empty() || keep_n == 0 {
            return Reranking {
                ranked: Vec::new(),
                ranked_by: self.name().to_string(),
            };
        }

        let started = Instant::now();
        match self.score_all(query, &candidates).await {
            Ok(scores) => {
                let ranked = candidates
                    .into_iter()
                    .zip(scores)
                    .enumerate()
                    .map(|(position, (candidate, score))| {
                        let mut ranked = RankedCandidate::from_retrieval(candidate, position + 1);
                        ranked.relevance_score = score;
                        ranked
                    })
                    .collect();

                let ranked = finalize_ranking(ranked, keep_n);
                tracing::debug!(
                    model = self.scorer.model_id(),
                    kept = ranked.len(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "rerank complete"
                );
                Reranking {
                    ranked,
                    ranked_by: self.name().to_string(),
                }
            }
            Err(err) => {
                tracing::warn!(
                    model = self.scorer.model_id(),
                    error = %err,
                    "rerank scoring failed, keeping retrieval order"
                );
                if let Some(telemetry) = &self.telemetry {
                    telemetry.record(PipelineEvent::RerankFallback {
                        reason: err.to_string(),
                        timestamp: Instant::now(),
                    });
                }
                Reranking {
                    ranked: IdentityReranker::pass_through(candidates, keep_n),
                    ranked_by: IdentityReranker.name().to_string(),
                }
            }
        }
    }

    fn name(&self) -> &str {
        self.scorer.model_id()
    }
}
