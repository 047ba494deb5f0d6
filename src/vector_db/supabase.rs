//! Supabase (PostgREST) RPC backend

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::config::VectorStoreConfig;
use crate::errors::{RagError, Result};
use crate::types::Candidate;
use crate::vector_db::{MatchRequest, VectorStore};

/// Vector store reached through Postgres functions exposed by PostgREST
#[derive(Debug, Clone)]
pub struct SupabaseStore {
    client: Client,
    base_url: String,
    api_key: String,
    match_function: String,
    topic_function: String,
    topic_chunk_limit: usize,
}

#[derive(Debug, Serialize)]
struct MatchParams<'a> {
    query_embedding: &'a [f32],
    match_threshold: f64,
    match_count: usize,
}

#[derive(Debug, Serialize)]
struct TopicParams<'a> {
    query_embedding: &'a [f32],
    match_topic: &'a str,
    match_count: usize,
}

impl SupabaseStore {
    /// Create a store from configuration; url and key must be set
    pub fn new(config: &VectorStoreConfig) -> Result<Self> {
        let (url, api_key) = match (&config.url, &config.api_key) {
            (Some(url), Some(key)) => (url, key),
            _ => {
                return Err(RagError::Config(
                    "Missing required settings: SUPABASE_URL, SUPABASE_KEY".to_string(),
                ))
            }
        };

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(RagError::Http)?;

        Ok(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
            api_key: api_key.clone(),
            match_function: config.match_function.clone(),
            topic_function: config.topic_function.clone(),
            topic_chunk_limit: config.topic_chunk_limit,
        })
    }

    async fn rpc<P: Serialize + ?Sized>(&self, function: &str, params: &P) -> Result<Vec<Candidate>> {
        let url = format!("{}/rest/v1/rpc/{}", self.base_url, function);

        let response = self
            .client
            .post(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .json(params)
            .send()
            .await
            .map_err(|e| RagError::Retrieval(format!("Failed to reach vector store: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RagError::Retrieval(format!(
                "{} returned HTTP {}: {}",
                function, status, error_text
            )));
        }

        response
            .json::<Vec<Candidate>>()
            .await
            .map_err(|e| RagError::Retrieval(format!("Malformed {} response: {}", function, e)))
    }
}

#[async_trait]
impl VectorStore for SupabaseStore {
    async fn match_chunks(&self, request: MatchRequest<'_>) -> Result<Vec<Candidate>> {
        let params = MatchParams {
            query_embedding: request.embedding,
            match_threshold: request.threshold,
            match_count: request.count,
        };
        self.rpc(&self.match_function, &params).await
    }

    async fn topic_chunks(&self, embedding: &[f32], topic: &str) -> Result<Vec<Candidate>> {
        let params = TopicParams {
            query_embedding: embedding,
            match_topic: topic,
            match_count: self.topic_chunk_limit,
        };
        self.rpc(&self.topic_function, &params).await
    }

    fn name(&self) -> &'static str {
        "supabase"
    }
}
