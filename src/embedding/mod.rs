//! Embedding generation
//!
//! An [`Embedder`] turns text into a fixed-dimension vector. Instances are
//! created once at process start and shared read-only (`Arc<dyn Embedder>`)
//! across concurrent requests. Implementations must be safe to call in
//! parallel; local models get there by funnelling inference through
//! [`InferenceSlots`].
//!
//! Backends:
//! - [`CandleEmbedder`]: BERT-family sentence model run in-process
//! - [`OllamaEmbedder`]: remote embeddings from the Ollama host

pub mod engine;
pub mod ollama;
pub mod runtime;

use async_trait::async_trait;
use std::future::Future;

use crate::errors::{RagError, Result};
use crate::types::EmbeddingVector;

pub use engine::CandleEmbedder;
pub use ollama::OllamaEmbedder;
pub use runtime::InferenceSlots;

/// Text to vector capability
///
/// Deterministic for a fixed model: identical text yields bit-identical
/// vectors, so results may be cached by (model, text).
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch, preserving input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>>;

    /// Dimension of every vector this instance produces
    fn dimension(&self) -> usize;

    /// Model identity
    fn model_id(&self) -> &str;

    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        ensure_not_blank(text)?;
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::ModelUnavailable("embedding model returned no vector".to_string()))
    }
}

/// Reject empty or whitespace-only input
pub fn ensure_not_blank(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(RagError::Input("cannot embed empty text".to_string()));
    }
    Ok(())
}

/// Check a model response against the expected shape
pub fn check_batch(vectors: &[EmbeddingVector], expected: usize, dimension: usize) -> Result<()> {
    if vectors.len() != expected {
        return Err(RagError::ModelUnavailable(format!(
            "expected {} embeddings, model returned {}",
            expected,
            vectors.len()
        )));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(RagError::ModelUnavailable(format!(
            "embedding dimension {} does not match model dimension {}",
            bad.len(),
            dimension
        )));
    }
    Ok(())
}

/// Encode `texts` in consecutive slices of at most `batch_size`
///
/// Bounds the size of a single forward pass; output stays in input order.
pub async fn embed_in_batches<F, Fut>(
    texts: &[String],
    batch_size: usize,
    mut encode: F,
) -> Result<Vec<EmbeddingVector>>
where
    F: FnMut(Vec<String>) -> Fut,
    Fut: Future<Output = Result<Vec<EmbeddingVector>>>,
{
    let mut vectors = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size.max(1)) {
        let encoded = encode(batch.to_vec()).await?;
        if encoded.len() != batch.len() {
            return Err(RagError::ModelUnavailable(format!(
                "expected {} embeddings, model returned {}",
                batch.len(),
                encoded.len()
            )));
        }
        vectors.extend(encoded);
    }
    Ok(vectors)
}

/// Cosine similarity; 0.0 when either vector has no magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
