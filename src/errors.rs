//! Error types for the ragquery pipeline
//!
//! Every failure inside the pipeline is a [`RagError`]. The orchestrator turns
//! whatever reaches its boundary into the structured response envelope, so
//! the variants double as the user-visible error taxonomy via [`RagError::kind`].

use thiserror::Error;

/// Main error type for the query pipeline
#[derive(Error, Debug)]
pub enum RagError {
    /// Request rejected before any model or network call
    #[error("{0}")]
    Validation(String),

    /// Component input that cannot be processed (e.g. blank text to embed)
    #[error("Invalid input: {0}")]
    Input(String),

    /// Embedding or generation model could not be loaded or invoked
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// Vector store unreachable or returned a malformed response
    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    /// Reranker scoring failure (never surfaced past the reranking stage)
    #[error("Rerank scoring failed: {0}")]
    Rerank(String),

    /// LLM provider error
    #[error("Generation failed: {0}")]
    Generation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Timeout errors
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, RagError>;

impl RagError {
    /// Stable tag reported in failure envelopes and `error` stream events
    pub fn kind(&self) -> &'static str {
        match self {
            RagError::Validation(_) => "validation_error",
            RagError::Input(_) => "input_error",
            RagError::ModelUnavailable(_) => "model_unavailable",
            RagError::Retrieval(_) => "retrieval_error",
            RagError::Rerank(_) => "rerank_error",
            RagError::Generation(_) => "generation_error",
            RagError::Config(_) => "config_error",
            RagError::Timeout { .. } => "timeout",
            RagError::Http(_) | RagError::Serialization(_) | RagError::Io(_) => "internal_error",
        }
    }

    /// Whether a single retry may succeed where this attempt failed
    pub fn is_transient(&self) -> bool {
        match self {
            RagError::Retrieval(_) => true,
            RagError::ModelUnavailable(_) => true,
            RagError::Timeout { .. } => true,
            RagError::Http(err) => err.is_connect() || err.is_timeout() || err.is_request(),

            RagError::Validation(_) => false,
            RagError::Input(_) => false,
            RagError::Config(_) => false,
            _ => false,
        }
    }

    /// Whether the caller, not the service, is at fault
    pub fn is_client_error(&self) -> bool {
        matches!(self, RagError::Validation(_) | RagError::Input(_))
    }
}
