//! In-process vector store
//!
//! Brute-force cosine search over a fixed set of chunks. Used by the `ask`
//! command's `--corpus` option and by tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::embedding::{cosine_similarity, Embedder};
use crate::errors::{RagError, Result};
use crate::types::{by_similarity_desc, Candidate, EmbeddingVector};
use crate::vector_db::{MatchRequest, VectorStore};

/// One stored chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    pub id: i64,
    pub content: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub chunk_id: i64,
    pub embedding: EmbeddingVector,
}

/// Chunk before it has been embedded
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkSource {
    pub id: i64,
    pub content: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub chunk_id: i64,
}

/// Vector store held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    chunks: Vec<StoredChunk>,
}

impl MemoryStore {
    pub fn new(chunks: Vec<StoredChunk>) -> Self {
        Self { chunks }
    }

    /// Embed every chunk of a JSON array file (`[{id, content, topic, chunk_id}]`)
    pub async fn from_json_file(path: &Path, embedder: &dyn Embedder) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await?;
        let sources: Vec<ChunkSource> = serde_json::from_str(&contents).map_err(|e| {
            RagError::Config(format!("Invalid corpus file {}: {}", path.display(), e))
        })?;

        let texts: Vec<String> = sources.iter().map(|s| s.content.clone()).collect();
        let embeddings = embedder.embed_batch(&texts).await?;

        let chunks = sources
            .into_iter()
            .zip(embeddings)
            .map(|(source, embedding)| StoredChunk {
                id: source.id,
                content: source.content,
                topic: source.topic,
                chunk_id: source.chunk_id,
                embedding,
            })
            .collect();

        Ok(Self::new(chunks))
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    fn score(&self, embedding: &[f32], chunk: &StoredChunk) -> Candidate {
        Candidate {
            id: chunk.id,
            content: chunk.content.clone(),
            topic: chunk.topic.clone(),
            chunk_id: chunk.chunk_id,
            similarity: cosine_similarity(embedding, &chunk.embedding),
        }
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn match_chunks(&self, request: MatchRequest<'_>) -> Result<Vec<Candidate>> {
        let mut rows: Vec<Candidate> = self
            .chunks
            .iter()
            .map(|chunk| self.score(request.embedding, chunk))
            .filter(|row| row.similarity >= request.threshold)
            .collect();

        rows.sort_by(by_similarity_desc);
        rows.truncate(request.count);
        Ok(rows)
    }

    async fn topic_chunks(&self, embedding: &[f32], topic: &str) -> Result<Vec<Candidate>> {
        let mut rows: Vec<Candidate> = self
            .chunks
            .iter()
            .filter(|chunk| chunk.topic == topic)
            .map(|chunk| self.score(embedding, chunk))
            .collect();

        rows.sort_by(by_similarity_desc);
        Ok(rows)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: i64, topic: &str, embedding: Vec<f32>) -> StoredChunk {
        StoredChunk {
            id,
            content: format!("chunk {}", id),
            topic: topic.to_string(),
            chunk_id: id,
            embedding,
        }
    }

    fn store() -> MemoryStore {
        MemoryStore::new(vec![
            chunk(1, "PIN", vec![1.0, 0.0]),
            chunk(2, "PIN", vec![0.6, 0.8]),
            chunk(3, "VPN", vec![0.0, 1.0]),
        ])
    }

    #[tokio::test]
    async fn test_match_thresholds_and_orders() {
        let rows = store()
            .match_chunks(MatchRequest {
                embedding: &[1.0, 0.0],
                threshold: 0.5,
                count: 10,
            })
            .await
            .unwrap();

        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_match_respects_count() {
        let rows = store()
            .match_chunks(MatchRequest {
                embedding: &[1.0, 0.0],
                threshold: -1.0,
                count: 1,
            })
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_topic_chunks_returns_only_topic() {
        let rows = store().topic_chunks(&[0.0, 1.0], "PIN").await.unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_corpus_file_requires_array() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, br#"{"id": 1}"#).unwrap();

        struct Unused;
        #[async_trait]
        impl Embedder for Unused {
            async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<EmbeddingVector>> {
                unreachable!()
            }
            fn dimension(&self) -> usize {
                0
            }
            fn model_id(&self) -> &str {
                "unused"
            }
        }

        let err = MemoryStore::from_json_file(file.path(), &Unused).await.unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }
}
