//! Query pipeline
//!
//! Composes embedder, retriever, reranker, context assembler and generator
//! into the synchronous and streamed query operations. Components are loaded
//! once ([`PipelineComponents`]) and shared by every request.

pub mod components;
pub mod orchestrator;
pub mod stream;

pub use components::PipelineComponents;
pub use orchestrator::QueryPipeline;
pub use stream::QueryStream;
