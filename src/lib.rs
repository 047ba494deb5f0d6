//! ragquery - Retrieval-Augmented Question Answering
//!
//! Answers natural-language questions from a semantic document index:
//! embed the question, retrieve matching chunks, optionally rerank them,
//! assemble a bounded context and generate an answer, either as one JSON
//! envelope or as an ordered event stream.
//!
//! # Architecture
//!
//! - **Components**: embedding, vector_db, retrieval, reranking, context,
//!   generation, streaming (Ollama client)
//! - **Pipeline**: orchestration, stream lifecycle, retry policy
//! - **Surface**: HTTP service and CLI

// Core types and errors
pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used types
pub use errors::{RagError, Result};

// Pipeline components
pub mod context;
pub mod embedding;
pub mod generation;
pub mod reranking;
pub mod retrieval;
pub mod streaming;
pub mod vector_db;

// Orchestration
pub mod pipeline;
pub mod retry;
pub mod telemetry;

pub use pipeline::{PipelineComponents, QueryPipeline, QueryStream};

// Service surface
pub mod cli;
pub mod server;
