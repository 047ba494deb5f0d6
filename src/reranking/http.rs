//! Remote rerank API scorer
//!
//! Speaks the common rerank wire format: `{model, query, documents}` in,
//! `results[{index, relevance_score}]` (or `data[{index, score}]`) out.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::config::RerankerConfig;
use crate::errors::{RagError, Result};
use crate::reranking::RelevanceScorer;

/// Relevance scorer backed by an HTTP rerank service
#[derive(Debug, Clone)]
pub struct HttpRerankScorer {
    client: Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpRerankScorer {
    pub fn new(config: &RerankerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(RagError::Http)?;

        Ok(Self {
            client,
            url: format!("{}{}", config.api_base.trim_end_matches('/'), config.api_path),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl RelevanceScorer for HttpRerankScorer {
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f64>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({ "model": self.model, "query": query, "documents": documents });
        let mut request = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RagError::Rerank(format!("Failed to reach rerank service: {}", e)))?;

        if !response.status().is_success() {
            return Err(RagError::Rerank(format!(
                "rerank service returned HTTP {}",
                response.status()
            )));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| RagError::Rerank(format!("Malformed rerank response: {}", e)))?;

        parse_rerank_response(&json, documents.len())
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Align scores to document order; every document must be scored
fn parse_rerank_response(json: &Value, doc_count: usize) -> Result<Vec<f64>> {
    let results = json
        .get("results")
        .or_else(|| json.get("data"))
        .and_then(|v| v.as_array())
        .ok_or_else(|| RagError::Rerank("Rerank response is missing results array".to_string()))?;

    let mut scores: Vec<Option<f64>> = vec![None; doc_count];
    for item in results {
        let index = item
            .get("index")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| RagError::Rerank("Rerank result missing index".to_string()))?
            as usize;
        let score = item
            .get("relevance_score")
            .or_else(|| item.get("score"))
            .and_then(|v| v.as_f64())
            .ok_or_else(|| RagError::Rerank("Rerank result missing score".to_string()))?;

        match scores.get_mut(index) {
            Some(slot) => *slot = Some(score),
            None => {
                return Err(RagError::Rerank(format!(
                    "Rerank result index {} out of range",
                    index
                )))
            }
        }
    }

    scores
        .into_iter()
        .enumerate()
        .map(|(index, score)| {
            score.ok_or_else(|| RagError::Rerank(format!("Document {} was not scored", index)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_aligns_scores_by_index() {
        let json = json!({
            "results": [
                { "index": 1, "relevance_score": 0.2 },
                { "index": 0, "relevance_score": 0.9 }
            ]
        });
        assert_eq!(parse_rerank_response(&json, 2).unwrap(), vec![0.9, 0.2]);
    }

    #[test]
    fn test_accepts_data_and_score_aliases() {
        let json = json!({ "data": [{ "index": 0, "score": 0.4 }] });
        assert_eq!(parse_rerank_response(&json, 1).unwrap(), vec![0.4]);
    }

    #[test]
    fn test_missing_document_is_error() {
        let json = json!({ "results": [{ "index": 0, "relevance_score": 0.4 }] });
        assert!(parse_rerank_response(&json, 2).is_err());

        let json = json!({ "results": [{ "index": 5, "relevance_score": 0.4 }] });
        assert!(parse_rerank_response(&json, 1).is_err());
    }

    #[tokio::test]
    async fn test_scores_through_service() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rerank"))
            .and(body_partial_json(json!({ "query": "reset PIN", "documents": ["a", "b"] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    { "index": 0, "relevance_score": 0.1 },
                    { "index": 1, "relevance_score": 0.8 }
                ]
            })))
            .mount(&server)
            .await;

        let scorer = HttpRerankScorer::new(&RerankerConfig {
            api_base: server.uri(),
            ..Default::default()
        })
        .unwrap();

        let scores = scorer
            .score("reset PIN", &["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(scores, vec![0.1, 0.8]);
    }
}
