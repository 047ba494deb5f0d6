//! Configuration management for ragquery
//!
//! Provides TOML-based configuration with defaults and validation.
//! Location: ~/.ragquery/config.toml
//!
//! The resolved [`RagConfig`] is built once at startup and each component
//! receives its own section in its constructor.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::{RagError, Result};

/// Complete configuration for ragquery
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub embedding: EmbeddingConfig,
    pub reranker: RerankerConfig,
    pub retrieval: RetrievalConfig,
    pub vector_store: VectorStoreConfig,
    pub generation: GenerationConfig,
    pub context: ContextConfig,
    pub retry: RetryConfig,
    pub server: ServerConfig,
}

/// Where embeddings are computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// Local BERT-family model run with candle
    Candle,
    /// Remote embeddings from the Ollama host
    Ollama,
}

/// Embedding model configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    /// Hugging Face repository or Ollama model name
    pub model: String,
    /// Concurrent inference calls allowed (1 = fully serialized)
    pub inference_slots: usize,
    /// Tokens kept per input
    pub max_tokens: usize,
    /// Texts per forward pass
    pub batch_size: usize,
}

/// Which relevance scorer backs the reranker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankerBackend {
    /// Local cross-encoder sequence classifier
    CrossEncoder,
    /// Remote rerank API
    Http,
}

/// Reranker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankerConfig {
    pub enabled: bool,
    pub backend: RerankerBackend,
    pub model: String,
    /// Candidates fetched from the retriever when reranking
    pub initial_retrieval_count: usize,
    /// Candidates kept after reranking
    pub final_result_count: usize,
    /// Pairs scored per model call
    pub batch_size: usize,
    pub inference_slots: usize,
    pub max_tokens: usize,
    /// Rerank API base URL (http backend)
    pub api_base: String,
    /// Rerank API path (http backend)
    pub api_path: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
}

/// Candidate search policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchPolicy {
    /// Up to `limit` rows above the threshold
    TopK,
    /// Best topic first, then every chunk of that topic
    TopicScoped,
}

/// Retrieval configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub policy: SearchPolicy,
    pub match_threshold: f64,
    pub match_count: usize,
    /// Rows inspected when picking the winning topic
    pub topic_probe_count: usize,
}

/// Vector store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorStoreBackend {
    Supabase,
    Qdrant,
    /// Chunks loaded from a local JSON corpus and searched in-process
    Memory,
}

/// Vector store connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub backend: VectorStoreBackend,
    pub url: Option<String>,
    pub api_key: Option<String>,
    /// Table (Supabase) or collection (Qdrant) holding the chunks
    pub table: String,
    /// RPC used for thresholded matching
    pub match_function: String,
    /// RPC returning every chunk of one topic
    pub topic_function: String,
    /// Upper bound on chunks fetched for one topic
    pub topic_chunk_limit: usize,
    pub timeout_ms: u64,
    /// JSON corpus for the memory backend
    pub corpus_path: Option<PathBuf>,
}

/// LLM provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub ollama_url: String,
    pub model: String,
    pub temperature: f64,
    pub timeout_secs: u64,
    pub system_prompt: String,
    /// Answer given when no context could be retrieved
    pub no_context_answer: String,
}

/// Unit the context budget is measured in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetUnit {
    Characters,
    /// Estimated tokens (4 characters per token, rounded up)
    Tokens,
}

/// Context assembly configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub budget: usize,
    pub unit: BudgetUnit,
}

/// Retry configuration for embedding and retrieval calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

/// HTTP service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Include internal error text in failure envelopes (development only)
    pub expose_error_details: bool,
}

/// Default system prompt for grounded answers
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant that answers questions based on the provided context.
Use the context below to answer the user's question accurately and concisely.
If the context doesn't contain enough information to answer the question, say so honestly and
reply that you do not know the answer. Base your answers solely on the provided context.
Be as concise as possible and try to answer in maximum two paragraphs.";

/// Default answer when nothing relevant was retrieved
pub const DEFAULT_NO_CONTEXT_ANSWER: &str =
    "I couldn't find any relevant information to answer your question.";

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Candle,
            model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            inference_slots: 1,
            max_tokens: 512,
            batch_size: 64,
        }
    }
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: RerankerBackend::CrossEncoder,
            model: "cross-encoder/ms-marco-MiniLM-L-6-v2".to_string(),
            initial_retrieval_count: 20,
            final_result_count: 5,
            batch_size: 16,
            inference_slots: 1,
            max_tokens: 512,
            api_base: "http://127.0.0.1:8080".to_string(),
            api_path: "/rerank".to_string(),
            api_key: None,
            timeout_ms: 10_000,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            policy: SearchPolicy::TopK,
            match_threshold: 0.7,
            match_count: 3,
            topic_probe_count: 10,
        }
    }
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: VectorStoreBackend::Supabase,
            url: None,
            api_key: None,
            table: "documents".to_string(),
            match_function: "match_doc".to_string(),
            topic_function: "match_topic_chunks".to_string(),
            topic_chunk_limit: 256,
            timeout_ms: 10_000,
            corpus_path: None,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://ollama:11434".to_string(),
            model: "llama3.2:latest".to_string(),
            temperature: 1.0,
            timeout_secs: 180,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            no_context_answer: DEFAULT_NO_CONTEXT_ANSWER.to_string(),
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            budget: 8000,
            unit: BudgetUnit::Characters,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff_ms: 250,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            expose_error_details: false,
        }
    }
}

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
    pub ollama_url: Option<String>,
    pub embedding_model: Option<String>,
    pub llm_model: Option<String>,
    pub reranker_enabled: Option<bool>,
    pub match_threshold: Option<f64>,
    pub match_count: Option<usize>,
    pub initial_retrieval_count: Option<usize>,
    pub final_result_count: Option<usize>,
    pub vector_table: Option<String>,
    pub port: Option<u16>,
}

impl RagConfig {
    /// Load configuration from file or use defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(config_path) => Self::load_from_file(config_path),
            None => Self::load_default(),
        }
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RagError::Config(format!("Failed to read config {}: {}", path.display(), e)))?;

        toml::from_str(&contents)
            .map_err(|e| RagError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load from the standard location, falling back to built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Some(config_path) = Self::default_path() {
            if config_path.exists() {
                return Self::load_from_file(&config_path);
            }
        }

        Ok(RagConfig::default())
    }

    /// Standard configuration file path
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".ragquery").join("config.toml"))
    }

    /// Apply command-line / environment overrides on top of file values
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(url) = overrides.supabase_url {
            self.vector_store.url = Some(url);
        }
        if let Some(key) = overrides.supabase_key {
            self.vector_store.api_key = Some(key);
        }
        if let Some(url) = overrides.ollama_url {
            self.generation.ollama_url = url;
        }
        if let Some(model) = overrides.embedding_model {
            self.embedding.model = model;
        }
        if let Some(model) = overrides.llm_model {
            self.generation.model = model;
        }
        if let Some(enabled) = overrides.reranker_enabled {
            self.reranker.enabled = enabled;
        }
        if let Some(threshold) = overrides.match_threshold {
            self.retrieval.match_threshold = threshold;
        }
        if let Some(count) = overrides.match_count {
            self.retrieval.match_count = count;
        }
        if let Some(count) = overrides.initial_retrieval_count {
            self.reranker.initial_retrieval_count = count;
        }
        if let Some(count) = overrides.final_result_count {
            self.reranker.final_result_count = count;
        }
        if let Some(table) = overrides.vector_table {
            self.vector_store.table = table;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.vector_store.backend == VectorStoreBackend::Supabase {
            let missing: Vec<&str> = [
                ("SUPABASE_URL", self.vector_store.url.is_none()),
                ("SUPABASE_KEY", self.vector_store.api_key.is_none()),
            ]
            .into_iter()
            .filter_map(|(name, absent)| absent.then_some(name))
            .collect();

            if !missing.is_empty() {
                return Err(RagError::Config(format!(
                    "Missing required settings: {}",
                    missing.join(", ")
                )));
            }
        }

        if self.vector_store.backend == VectorStoreBackend::Qdrant && self.vector_store.url.is_none() {
            return Err(RagError::Config("Qdrant backend requires vector_store.url".to_string()));
        }

        if self.vector_store.backend == VectorStoreBackend::Memory
            && self.vector_store.corpus_path.is_none()
        {
            return Err(RagError::Config(
                "Memory backend requires vector_store.corpus_path".to_string(),
            ));
        }

        validate_threshold(self.retrieval.match_threshold)?;

        if self.retrieval.match_count == 0 {
            return Err(RagError::Config("match_count must be greater than 0".to_string()));
        }

        if self.retrieval.topic_probe_count == 0 {
            return Err(RagError::Config(
                "topic_probe_count must be greater than 0".to_string(),
            ));
        }

        if self.reranker.initial_retrieval_count == 0 || self.reranker.final_result_count == 0 {
            return Err(RagError::Config(
                "initial_retrieval_count and final_result_count must be greater than 0".to_string(),
            ));
        }

        if self.reranker.final_result_count > self.reranker.initial_retrieval_count {
            return Err(RagError::Config(
                "final_result_count must not exceed initial_retrieval_count".to_string(),
            ));
        }

        if self.reranker.batch_size == 0 {
            return Err(RagError::Config("reranker batch_size must be greater than 0".to_string()));
        }

        if self.embedding.batch_size == 0 {
            return Err(RagError::Config("embedding batch_size must be greater than 0".to_string()));
        }

        if self.embedding.inference_slots == 0 || self.reranker.inference_slots == 0 {
            return Err(RagError::Config("inference_slots must be greater than 0".to_string()));
        }

        if self.context.budget == 0 {
            return Err(RagError::Config("context budget must be greater than 0".to_string()));
        }

        if self.retry.max_attempts == 0 {
            return Err(RagError::Config("retry max_attempts must be at least 1".to_string()));
        }

        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(RagError::Config(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Cosine thresholds live in [-1, 1]
pub fn validate_threshold(threshold: f64) -> Result<()> {
    if !threshold.is_finite() || !(-1.0..=1.0).contains(&threshold) {
        return Err(RagError::Config(format!(
            "match_threshold {} must be between -1.0 and 1.0",
            threshold
        )));
    }
    Ok(())
}
