//! Query orchestrator - main coordinator
//!
//! Runs one request through the pipeline:
//! - Validation and option defaults
//! - Embedding and retrieval (each retried once on transient failure)
//! - Rerank or identity ordering
//! - Context assembly and generation
//!
//! Every error reaching this boundary becomes a [`QueryResponse`] failure
//! envelope or a terminal `error` event; nothing else escapes.

use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::config::{validate_threshold, RagConfig};
use crate::context::{Context, ContextAssembler};
use crate::embedding::Embedder;
use crate::errors::{RagError, Result};
use crate::generation::Generator;
use crate::pipeline::{PipelineComponents, QueryStream};
use crate::reranking::{IdentityReranker, Reranker};
use crate::retrieval::Retriever;
use crate::retry::RetryPolicy;
use crate::telemetry::{PipelineEvent, PipelineTelemetry, Stage};
use crate::types::{
    Answer, Query, QueryResponse, RankedCandidate, ResolvedOptions, ResponseMetadata, StreamEvent,
};

/// Values applied to options a request leaves unset
#[derive(Debug, Clone, Copy, PartialEq)]
struct QueryDefaults {
    match_threshold: f64,
    match_count: usize,
    initial_retrieval_count: usize,
    final_result_count: usize,
}

/// Everything produced before generation starts
struct Grounding {
    /// Post-rerank candidate list
    ranked: Vec<RankedCandidate>,
    /// Candidates that made it into the context
    sources: Vec<RankedCandidate>,
    context: Context,
    metadata: ResponseMetadata,
}

/// Main query pipeline
///
/// Cheap to clone; every clone shares the same models and clients.
#[derive(Clone)]
pub struct QueryPipeline {
    embedder: Arc<dyn Embedder>,
    retriever: Retriever,
    reranker: Option<Arc<dyn Reranker>>,
    identity: Arc<dyn Reranker>,
    assembler: ContextAssembler,
    generator: Generator,
    embed_retry: RetryPolicy,
    defaults: QueryDefaults,
    expose_error_details: bool,
    telemetry: PipelineTelemetry,
}

impl QueryPipeline {
    /// Wire components together
    pub fn new(components: PipelineComponents, config: &RagConfig, telemetry: PipelineTelemetry) -> Self {
        let retry = RetryPolicy::from_config(&config.retry).with_telemetry(telemetry.clone());

        Self {
            embedder: components.embedder,
            retriever: Retriever::new(components.store, &config.retrieval, retry.clone()),
            reranker: components.reranker,
            identity: Arc::new(IdentityReranker),
            assembler: ContextAssembler::new(&config.context),
            generator: Generator::new(components.provider, &config.generation),
            embed_retry: retry,
            defaults: QueryDefaults {
                match_threshold: config.retrieval.match_threshold,
                match_count: config.retrieval.match_count,
                initial_retrieval_count: config.reranker.initial_retrieval_count,
                final_result_count: config.reranker.final_result_count,
            },
            expose_error_details: config.server.expose_error_details,
            telemetry,
        }
    }

    /// Load components from configuration and wire them together
    pub async fn from_config(config: &RagConfig) -> Result<Self> {
        let telemetry = PipelineTelemetry::new();
        let components = PipelineComponents::from_config(config, &telemetry).await?;
        Ok(Self::new(components, config, telemetry))
    }

    pub fn telemetry(&self) -> &PipelineTelemetry {
        &self.telemetry
    }

    /// Whether a scoring reranker was loaded
    pub fn reranker_available(&self) -> bool {
        self.reranker.is_some()
    }

    pub fn model_id(&self) -> &str {
        self.generator.model_id()
    }

    /// Validate the request and fill unset options
    pub fn resolve(&self, query: &Query) -> Result<ResolvedOptions> {
        if query.question.trim().is_empty() {
            return Err(RagError::Validation("Question cannot be empty".to_string()));
        }

        let match_threshold = query.match_threshold.unwrap_or(self.defaults.match_threshold);
        validate_threshold(match_threshold).map_err(|_| {
            RagError::Validation(format!(
                "match_threshold must be between -1.0 and 1.0, got {}",
                match_threshold
            ))
        })?;

        let match_count = query.match_count.unwrap_or(self.defaults.match_count);
        if match_count == 0 {
            return Err(RagError::Validation("match_count must be greater than 0".to_string()));
        }

        let rerank = self.reranker.is_some() && query.rerank.unwrap_or(true);
        let (retrieval_limit, keep_n) = if rerank {
            let final_count = self.defaults.final_result_count;
            let keep_n = query.match_count.map_or(final_count, |count| count.min(final_count));
            (self.defaults.initial_retrieval_count, keep_n)
        } else {
            (match_count, match_count)
        };

        Ok(ResolvedOptions {
            match_threshold,
            match_count,
            rerank,
            retrieval_limit,
            keep_n,
        })
    }

    /// Answer a query with one complete response envelope
    pub async fn execute_query(&self, query: Query) -> QueryResponse {
        let request_id = Uuid::new_v4().to_string();
        self.telemetry.record(PipelineEvent::QueryStarted {
            request_id: request_id.clone(),
            streaming: false,
            timestamp: Instant::now(),
        });

        match self.answer(&query, &request_id).await {
            Ok((answer, mut grounding)) => {
                grounding.metadata.num_sources = grounding.sources.len();
                self.telemetry.record(PipelineEvent::QueryCompleted {
                    request_id: request_id.clone(),
                    timestamp: Instant::now(),
                });
                tracing::info!(
                    request_id = %request_id,
                    sources = grounding.sources.len(),
                    grounded = answer.grounded,
                    "query answered"
                );
                QueryResponse::answered(answer, grounding.sources, grounding.metadata)
            }
            Err(err) => self.fail(&request_id, &err),
        }
    }

    /// Answer a query as an event stream
    ///
    /// Validation, embedding and retrieval finish before this returns, so
    /// their failures come back as a failure envelope instead of a stream.
    pub async fn execute_query_stream(&self, query: Query) -> std::result::Result<QueryStream, QueryResponse> {
        let request_id = Uuid::new_v4().to_string();
        self.telemetry.record(PipelineEvent::QueryStarted {
            request_id: request_id.clone(),
            streaming: true,
            timestamp: Instant::now(),
        });

        let grounding = match self.ground(&query, &request_id).await {
            Ok(grounding) => grounding,
            Err(err) => return Err(self.fail(&request_id, &err)),
        };

        let preamble = stream::iter(vec![
            StreamEvent::Sources(grounding.ranked),
            StreamEvent::Metadata(grounding.metadata),
        ]);
        let answer = self.generator.generate_stream(&query.question, &grounding.context);

        tracing::debug!(request_id = %request_id, "stream opened");
        Ok(QueryStream::new(
            preamble.chain(answer).boxed(),
            request_id,
            self.telemetry.clone(),
        ))
    }

    async fn answer(&self, query: &Query, request_id: &str) -> Result<(Answer, Grounding)> {
        let grounding = self.ground(query, request_id).await?;

        let started = Instant::now();
        let answer = self.generator.generate(&query.question, &grounding.context).await?;
        self.telemetry.stage(Stage::Generate, started);

        Ok((answer, grounding))
    }

    /// Steps up to and including context assembly
    async fn ground(&self, query: &Query, request_id: &str) -> Result<Grounding> {
        let options = self.resolve(query)?;
        tracing::debug!(
            request_id,
            threshold = options.match_threshold,
            limit = options.retrieval_limit,
            keep = options.keep_n,
            rerank = options.rerank,
            "query options resolved"
        );

        let started = Instant::now();
        let vector = self
            .embed_retry
            .execute("embed", || self.embedder.embed(&query.question))
            .await?;
        self.telemetry.stage(Stage::Embed, started);

        let started = Instant::now();
        let candidates = self
            .retriever
            .retrieve(&vector, options.match_threshold, options.retrieval_limit)
            .await?;
        self.telemetry.stage(Stage::Retrieve, started);
        let retrieved = candidates.len();

        let transform = match (&self.reranker, options.rerank) {
            (Some(reranker), true) => reranker,
            _ => &self.identity,
        };

        let started = Instant::now();
        let reranking = transform.apply(&query.question, candidates, options.keep_n).await;
        self.telemetry.stage(Stage::Rerank, started);
        let ranked = reranking.ranked;

        let started = Instant::now();
        let (context, sources) = self.assembler.build(&ranked);
        self.telemetry.stage(Stage::Context, started);

        tracing::info!(
            request_id,
            retrieved,
            ranked = ranked.len(),
            sources = sources.len(),
            context_size = context.size,
            reranker = %reranking.ranked_by,
            "retrieval complete"
        );

        let metadata = ResponseMetadata {
            request_id: request_id.to_string(),
            question: query.question.clone(),
            num_sources: ranked.len(),
            match_threshold: options.match_threshold,
            retrieved,
            reranker: reranking.ranked_by,
        };

        Ok(Grounding {
            ranked,
            sources,
            context,
            metadata,
        })
    }

    fn fail(&self, request_id: &str, err: &RagError) -> QueryResponse {
        self.telemetry.record(PipelineEvent::QueryFailed {
            request_id: request_id.to_string(),
            kind: err.kind().to_string(),
            timestamp: Instant::now(),
        });

        if err.is_client_error() {
            tracing::info!(request_id, error = %err, "query rejected");
        } else {
            tracing::error!(request_id, kind = err.kind(), error = %err, "query failed");
        }

        QueryResponse::failure(err, self.expose_error_details)
    }
}
