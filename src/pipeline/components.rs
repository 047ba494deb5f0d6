//! Long-lived collaborators shared by every request

use std::sync::Arc;

use crate::config::{EmbeddingBackend, RagConfig, RerankerBackend, VectorStoreBackend};
use crate::embedding::{CandleEmbedder, Embedder, OllamaEmbedder};
use crate::errors::{RagError, Result};
use crate::generation::CompletionProvider;
use crate::reranking::{CrossEncoderScorer, HttpRerankScorer, ModelReranker, RelevanceScorer, Reranker};
use crate::streaming::OllamaClient;
use crate::telemetry::PipelineTelemetry;
use crate::vector_db::{MemoryStore, QdrantStore, SupabaseStore, VectorStore};

/// Models and clients loaded once at startup
#[derive(Clone)]
pub struct PipelineComponents {
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<dyn VectorStore>,
    /// Scoring reranker; `None` runs every request through identity ordering
    pub reranker: Option<Arc<dyn Reranker>>,
    pub provider: Arc<dyn CompletionProvider>,
}

impl PipelineComponents {
    /// Load every component named by the configuration
    ///
    /// Embedding, store and provider failures are fatal. A reranker that
    /// cannot be loaded is logged and left out.
    pub async fn from_config(config: &RagConfig, telemetry: &PipelineTelemetry) -> Result<Self> {
        config.validate()?;

        let embedder = load_embedder(config).await?;
        tracing::info!(
            model = embedder.model_id(),
            dimension = embedder.dimension(),
            "embedding model ready"
        );

        let store = open_store(config, embedder.as_ref()).await?;
        tracing::info!(store = store.name(), "vector store ready");

        let reranker = if config.reranker.enabled {
            match load_scorer(config).await {
                Ok(scorer) => {
                    tracing::info!(model = scorer.model_id(), "reranker ready");
                    let reranker = ModelReranker::new(scorer, config.reranker.batch_size)
                        .with_telemetry(telemetry.clone());
                    Some(Arc::new(reranker) as Arc<dyn Reranker>)
                }
                Err(err) => {
                    tracing::warn!(error = %err, "reranker unavailable, continuing without it");
                    None
                }
            }
        } else {
            None
        };

        let provider: Arc<dyn CompletionProvider> = Arc::new(OllamaClient::new(&config.generation)?);

        Ok(Self {
            embedder,
            store,
            reranker,
            provider,
        })
    }
}

async fn load_embedder(config: &RagConfig) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match config.embedding.backend {
        EmbeddingBackend::Candle => Arc::new(CandleEmbedder::load(&config.embedding).await?),
        EmbeddingBackend::Ollama => Arc::new(
            OllamaEmbedder::connect(&config.generation.ollama_url, &config.embedding.model).await?,
        ),
    };
    Ok(embedder)
}

async fn open_store(config: &RagConfig, embedder: &dyn Embedder) -> Result<Arc<dyn VectorStore>> {
    let store: Arc<dyn VectorStore> = match config.vector_store.backend {
        VectorStoreBackend::Supabase => Arc::new(SupabaseStore::new(&config.vector_store)?),
        VectorStoreBackend::Qdrant => Arc::new(QdrantStore::new(&config.vector_store)?),
        VectorStoreBackend::Memory => {
            let path = config.vector_store.corpus_path.as_deref().ok_or_else(|| {
                RagError::Config("Memory backend requires vector_store.corpus_path".to_string())
            })?;
            let store = MemoryStore::from_json_file(path, embedder).await?;
            tracing::info!(chunks = store.len(), path = %path.display(), "corpus indexed");
            Arc::new(store)
        }
    };
    Ok(store)
}

async fn load_scorer(config: &RagConfig) -> Result<Arc<dyn RelevanceScorer>> {
    let scorer: Arc<dyn RelevanceScorer> = match config.reranker.backend {
        RerankerBackend::CrossEncoder => Arc::new(CrossEncoderScorer::load(&config.reranker).await?),
        RerankerBackend::Http => Arc::new(HttpRerankScorer::new(&config.reranker)?),
    };
    Ok(scorer)
}
