//! Inbound query types
//!
//! A [`Query`] is created per request and discarded after the response. Unset
//! options are filled from configuration by the orchestrator, producing
//! [`ResolvedOptions`].

use serde::{Deserialize, Serialize};

/// Natural-language question plus optional per-request overrides
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Raw question text
    pub question: String,

    /// Number of matches to request when reranking is off
    ///
    /// With reranking on, retrieval still fetches the configured initial
    /// count and this caps how many reranked results are kept.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_count: Option<usize>,

    /// Minimum similarity a match must reach
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_threshold: Option<f64>,

    /// Per-request reranker toggle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank: Option<bool>,
}

impl Query {
    /// Create a query with every option left to configuration defaults
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            match_count: None,
            match_threshold: None,
            rerank: None,
        }
    }

    /// Override the similarity threshold
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.match_threshold = Some(threshold);
        self
    }

    /// Override the match count
    pub fn with_match_count(mut self, count: usize) -> Self {
        self.match_count = Some(count);
        self
    }

    /// Enable or disable reranking for this request
    pub fn with_rerank(mut self, enabled: bool) -> Self {
        self.rerank = Some(enabled);
        self
    }
}

/// Options after defaults have been applied
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolvedOptions {
    pub match_threshold: f64,
    pub match_count: usize,
    /// Whether the scoring reranker runs for this request
    pub rerank: bool,
    /// How many candidates the retriever is asked for
    pub retrieval_limit: usize,
    /// How many candidates survive the rerank stage
    pub keep_n: usize,
}
