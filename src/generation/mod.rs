//! Answer generation
//!
//! The [`Generator`] owns prompt policy (system prompt, no-context fallback)
//! and drives a [`CompletionProvider`], the network-backed LLM collaborator.

pub mod generator;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::errors::Result;

pub use generator::{EventStream, Generator};

/// Incremental text fragments from the provider
///
/// Ends after the last fragment; an `Err` item is a mid-stream failure and
/// nothing follows it.
pub type FragmentStream = BoxStream<'static, Result<String>>;

/// One provider conversation: system prompt, grounding context and question
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub context: String,
    pub question: String,
}

impl CompletionRequest {
    /// User turn combining context and question
    pub fn prompt(&self) -> String {
        format!(
            "Context:\n{}\n\nQuestion: {}\n\nAnswer:",
            self.context, self.question
        )
    }
}

/// LLM completion collaborator
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Whole answer in one response
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// Open a held connection yielding fragments as they are produced
    async fn complete_stream(&self, request: &CompletionRequest) -> Result<FragmentStream>;

    fn model_id(&self) -> &str;
}
