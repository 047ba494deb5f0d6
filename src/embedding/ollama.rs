//! Remote embeddings via the Ollama `/api/embed` endpoint

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::embedding::{check_batch, ensure_not_blank, Embedder};
use crate::errors::{RagError, Result};
use crate::types::EmbeddingVector;

/// Request timeout for one embedding batch
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Text used to discover the model dimension at startup
const DIMENSION_PROBE: &str = "dimension probe";

/// Embedder backed by an Ollama embedding model
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedder {
    /// Connect and learn the model dimension with one probe call
    pub async fn connect(base_url: &str, model: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(RagError::Http)?;

        let mut embedder = Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimension: 0,
        };

        let probe = embedder.request(&[DIMENSION_PROBE.to_string()]).await?;
        embedder.dimension = probe
            .first()
            .map(Vec::len)
            .filter(|dim| *dim > 0)
            .ok_or_else(|| RagError::ModelUnavailable(format!("{} returned an empty embedding", model)))?;

        tracing::info!(model, dimension = embedder.dimension, "ollama embedding model ready");
        Ok(embedder)
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        let url = format!("{}/api/embed", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&EmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| RagError::ModelUnavailable(format!("Failed to reach embedding model: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RagError::ModelUnavailable(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let body: EmbedResponse = response
            .json()
            .await
            .map_err(|e| RagError::ModelUnavailable(format!("Malformed embedding response: {}", e)))?;

        Ok(body.embeddings)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        for text in texts {
            ensure_not_blank(text)?;
        }

        let vectors = self.request(texts).await?;
        check_batch(&vectors, texts.len(), self.dimension)?;
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
