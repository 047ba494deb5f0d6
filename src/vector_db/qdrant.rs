//! Qdrant backend
//!
//! Each chunk is a point with a numeric id and payload fields `content`,
//! `topic` and `chunk_id`. The collection must use cosine distance so point
//! scores are cosine similarities.

#![allow(deprecated)]

use async_trait::async_trait;
use qdrant_client::{
    client::QdrantClient,
    qdrant::{
        condition::ConditionOneOf, point_id::PointIdOptions, r#match::MatchValue, value::Kind,
        with_payload_selector::SelectorOptions, Condition, FieldCondition, Filter, Match,
        PointId, ScoredPoint, SearchPoints, Value as QdrantValue, WithPayloadSelector,
    },
};
use std::collections::HashMap;

use crate::config::VectorStoreConfig;
use crate::errors::{RagError, Result};
use crate::types::Candidate;
use crate::vector_db::{MatchRequest, VectorStore};

/// Vector store backed by a Qdrant collection
pub struct QdrantStore {
    client: QdrantClient,
    collection: String,
    topic_chunk_limit: usize,
}

impl QdrantStore {
    /// Connect to the configured Qdrant instance
    pub fn new(config: &VectorStoreConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| RagError::Config("Qdrant backend requires vector_store.url".to_string()))?;

        let client = QdrantClient::from_url(url)
            .build()
            .map_err(|e| RagError::Config(format!("Failed to create Qdrant client: {}", e)))?;

        Ok(Self {
            client,
            collection: config.table.clone(),
            topic_chunk_limit: config.topic_chunk_limit,
        })
    }

    async fn search(&self, request: SearchPoints) -> Result<Vec<Candidate>> {
        let response = self
            .client
            .search_points(&request)
            .await
            .map_err(|e| RagError::Retrieval(format!("Qdrant search failed: {}", e)))?;

        response.result.into_iter().map(point_to_candidate).collect()
    }

    fn base_request(&self, embedding: &[f32], limit: usize) -> SearchPoints {
        SearchPoints {
            collection_name: self.collection.clone(),
            vector: embedding.to_vec(),
            limit: limit as u64,
            with_payload: Some(WithPayloadSelector {
                selector_options: Some(SelectorOptions::Enable(true)),
            }),
            ..Default::default()
        }
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn match_chunks(&self, request: MatchRequest<'_>) -> Result<Vec<Candidate>> {
        let search = SearchPoints {
            score_threshold: Some(request.threshold as f32),
            ..self.base_request(request.embedding, request.count)
        };
        self.search(search).await
    }

    async fn topic_chunks(&self, embedding: &[f32], topic: &str) -> Result<Vec<Candidate>> {
        let search = SearchPoints {
            filter: Some(topic_filter(topic)),
            ..self.base_request(embedding, self.topic_chunk_limit)
        };
        self.search(search).await
    }

    fn name(&self) -> &'static str {
        "qdrant"
    }
}

/// Exact keyword match on the `topic` payload field
fn topic_filter(topic: &str) -> Filter {
    Filter {
        must: vec![Condition {
            condition_one_of: Some(ConditionOneOf::Field(FieldCondition {
                key: "topic".to_string(),
                r#match: Some(Match {
                    match_value: Some(MatchValue::Keyword(topic.to_string())),
                }),
                ..Default::default()
            })),
        }],
        ..Default::default()
    }
}

fn point_to_candidate(point: ScoredPoint) -> Result<Candidate> {
    let id = numeric_id(&point.id)?;
    let payload = point.payload;

    let content = payload_string(&payload, "content").ok_or_else(|| {
        RagError::Retrieval(format!("Qdrant point {} has no content payload", id))
    })?;

    Ok(Candidate {
        id,
        content,
        topic: payload_string(&payload, "topic").unwrap_or_default(),
        chunk_id: payload_integer(&payload, "chunk_id").unwrap_or_default(),
        similarity: point.score as f64,
    })
}

fn numeric_id(point_id: &Option<PointId>) -> Result<i64> {
    match point_id.as_ref().and_then(|id| id.point_id_options.as_ref()) {
        Some(PointIdOptions::Num(n)) => i64::try_from(*n)
            .map_err(|_| RagError::Retrieval(format!("Qdrant point id {} out of range", n))),
        Some(PointIdOptions::Uuid(u)) => Err(RagError::Retrieval(format!(
            "Qdrant point id {} is not numeric",
            u
        ))),
        None => Err(RagError::Retrieval("Qdrant point without id".to_string())),
    }
}

fn payload_string(payload: &HashMap<String, QdrantValue>, key: &str) -> Option<String> {
    match payload.get(key)?.kind.as_ref()? {
        Kind::StringValue(s) => Some(s.clone()),
        _ => None,
    }
}

fn payload_integer(payload: &HashMap<String, QdrantValue>, key: &str) -> Option<i64> {
    match payload.get(key)?.kind.as_ref()? {
        Kind::IntegerValue(i) => Some(*i),
        Kind::DoubleValue(f) => Some(*f as i64),
        _ => None,
    }
}
