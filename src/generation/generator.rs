//! Complete and streamed answer generation

use futures_util::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;

use crate::config::GenerationConfig;
use crate::context::Context;
use crate::errors::Result;
use crate::generation::{CompletionProvider, CompletionRequest, FragmentStream};
use crate::types::{Answer, StreamEvent, StreamSummary};

/// Lazy, finite sequence of `chunk` events ending in `done` or `error`
pub type EventStream = BoxStream<'static, StreamEvent>;

/// Generator over a shared completion provider
#[derive(Clone)]
pub struct Generator {
    provider: Arc<dyn CompletionProvider>,
    system_prompt: String,
    no_context_answer: String,
}

enum Progress {
    /// Provider not contacted yet
    Pending(Arc<dyn CompletionProvider>, CompletionRequest),
    Streaming { fragments: FragmentStream, chunks: usize },
    Finished,
}

impl Generator {
    pub fn new(provider: Arc<dyn CompletionProvider>, config: &GenerationConfig) -> Self {
        Self {
            provider,
            system_prompt: config.system_prompt.clone(),
            no_context_answer: config.no_context_answer.clone(),
        }
    }

    pub fn model_id(&self) -> &str {
        self.provider.model_id()
    }

    fn request(&self, question: &str, context: &Context) -> CompletionRequest {
        CompletionRequest {
            system_prompt: self.system_prompt.clone(),
            context: context.text.clone(),
            question: question.to_string(),
        }
    }

    /// Whole answer; an empty context yields the fallback without a provider call
    pub async fn generate(&self, question: &str, context: &Context) -> Result<Answer> {
        if context.is_empty() {
            return Ok(Answer {
                text: self.no_context_answer.clone(),
                model: None,
                grounded: false,
            });
        }

        let text = self.provider.complete(&self.request(question, context)).await?;
        Ok(Answer {
            text,
            model: Some(self.provider.model_id().to_string()),
            grounded: true,
        })
    }

    /// Streamed answer
    ///
    /// Nothing is sent to the provider until the stream is first polled.
    /// Dropping the stream drops the provider connection.
    pub fn generate_stream(&self, question: &str, context: &Context) -> EventStream {
        if context.is_empty() {
            return stream::iter(vec![
                StreamEvent::Chunk(self.no_context_answer.clone()),
                StreamEvent::Done(StreamSummary { chunks: 1 }),
            ])
            .boxed();
        }

        let initial = Progress::Pending(self.provider.clone(), self.request(question, context));

        stream::unfold(initial, |progress| async move {
            match progress {
                Progress::Pending(provider, request) => match provider.complete_stream(&request).await {
                    Ok(fragments) => next_event(fragments, 0).await,
                    Err(err) => {
                        tracing::warn!(error = %err, "provider stream could not be opened");
                        Some((StreamEvent::failure(&err), Progress::Finished))
                    }
                },
                Progress::Streaming { fragments, chunks } => next_event(fragments, chunks).await,
                Progress::Finished => None,
            }
        })
        .boxed()
    }
}

/// Pull the next non-empty fragment, or the terminal event
async fn next_event(mut fragments: FragmentStream, chunks: usize) -> Option<(StreamEvent, Progress)> {
    loop {
        match fragments.next().await {
            Some(Ok(text)) if text.is_empty() => continue,
            Some(Ok(text)) => {
                return Some((
                    StreamEvent::Chunk(text),
                    Progress::Streaming {
                        fragments,
                        chunks: chunks + 1,
                    },
                ))
            }
            Some(Err(err)) => {
                tracing::warn!(error = %err, chunks, "provider failed mid-stream");
                return Some((StreamEvent::failure(&err), Progress::Finished));
            }
            None => return Some((StreamEvent::Done(StreamSummary { chunks }), Progress::Finished)),
        }
    }
}
