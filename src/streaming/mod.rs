//! Streaming client module
//!
//! Provides the Ollama completion client and the incremental NDJSON parser.

pub mod client;
pub mod parser;

// Re-export commonly used types
pub use client::OllamaClient;
pub use parser::{ChunkParser, GenerateChunk, MAX_BUFFER_SIZE};
