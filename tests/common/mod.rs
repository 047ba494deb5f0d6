//! Shared test doubles for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ragquery::config::{RagConfig, SearchPolicy};
use ragquery::embedding::{ensure_not_blank, Embedder, InferenceSlots};
use ragquery::generation::{CompletionProvider, CompletionRequest, FragmentStream};
use ragquery::reranking::{ModelReranker, RelevanceScorer, Reranker};
use ragquery::telemetry::PipelineTelemetry;
use ragquery::types::Candidate;
use ragquery::vector_db::{MatchRequest, VectorStore};
use ragquery::{PipelineComponents, QueryPipeline, RagError, Result};

/// Deterministic embedder: a hash of the text spread over a small vector
///
/// Inference goes through a single [`InferenceSlots`] gate and the highest
/// number of overlapping calls is recorded.
pub struct HashEmbedder {
    slots: InferenceSlots,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    pub calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self {
            slots: InferenceSlots::new(1),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

fn hash_vector(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; 8];
    for (i, byte) in text.bytes().enumerate() {
        vector[(i + byte as usize) % 8] += byte as f32 / 255.0;
    }
    vector
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        for text in texts {
            ensure_not_blank(text)?;
        }
        self.calls.fetch_add(1, Ordering::SeqCst);

        let texts = texts.to_vec();
        let in_flight = self.in_flight.clone();
        let peak = self.peak.clone();

        self.slots
            .run(move || {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(5));
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(texts.iter().map(|t| hash_vector(t)).collect())
            })
            .await
    }

    fn dimension(&self) -> usize {
        8
    }

    fn model_id(&self) -> &str {
        "hash-embedder"
    }
}

/// Store returning precomputed rows, the way a remote match RPC does
///
/// `match_chunks` keeps rows at or above the threshold up to the count;
/// `topic_chunks` returns every row of the topic.
pub struct FixtureStore {
    rows: Vec<Candidate>,
    pub match_calls: AtomicUsize,
    failures_left: AtomicUsize,
}

impl FixtureStore {
    pub fn new(rows: Vec<Candidate>) -> Self {
        Self {
            rows,
            match_calls: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(0),
        }
    }

    /// Fail the next `n` calls with a transport error
    pub fn failing(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    fn maybe_fail(&self) -> Result<()> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(RagError::Retrieval("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for FixtureStore {
    async fn match_chunks(&self, request: MatchRequest<'_>) -> Result<Vec<Candidate>> {
        self.match_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail()?;

        let mut rows: Vec<Candidate> = self
            .rows
            .iter()
            .filter(|row| row.similarity >= request.threshold)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        rows.truncate(request.count);
        Ok(rows)
    }

    async fn topic_chunks(&self, _embedding: &[f32], topic: &str) -> Result<Vec<Candidate>> {
        self.maybe_fail()?;
        Ok(self.rows.iter().filter(|row| row.topic == topic).cloned().collect())
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}

/// Completion provider replaying scripted fragments and recording requests
pub struct ScriptedProvider {
    fragments: Vec<std::result::Result<String, String>>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn answering(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|f| Ok(f.to_string())).collect(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Yield `fragments`, then fail as if the connection dropped
    pub fn disconnecting_after(fragments: &[&str]) -> Self {
        let mut scripted: Vec<std::result::Result<String, String>> =
            fragments.iter().map(|f| Ok(f.to_string())).collect();
        scripted.push(Err("Provider closed the stream before completion".to_string()));
        Self {
            fragments: scripted,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    fn replay(&self) -> Vec<Result<String>> {
        self.fragments
            .iter()
            .map(|item| item.clone().map_err(RagError::Generation))
            .collect()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        self.replay().into_iter().collect()
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<FragmentStream> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(stream::iter(self.replay()).boxed())
    }

    fn model_id(&self) -> &str {
        "scripted-llm"
    }
}

/// Scorer ranking documents by a number embedded in their content
///
/// Content `"doc 7 ..."` scores `7 / 100`, so relevance order can be chosen
/// independently of retrieval similarity.
pub struct ContentScorer;

#[async_trait]
impl RelevanceScorer for ContentScorer {
    async fn score(&self, _query: &str, documents: &[String]) -> Result<Vec<f64>> {
        Ok(documents
            .iter()
            .map(|doc| {
                doc.split_whitespace()
                    .nth(1)
                    .and_then(|n| n.parse::<f64>().ok())
                    .map(|n| n / 100.0)
                    .unwrap_or(0.0)
            })
            .collect())
    }

    fn model_id(&self) -> &str {
        "content-scorer"
    }
}

/// Scorer that always fails
pub struct BrokenScorer;

#[async_trait]
impl RelevanceScorer for BrokenScorer {
    async fn score(&self, _query: &str, _documents: &[String]) -> Result<Vec<f64>> {
        Err(RagError::Rerank("scorer crashed".to_string()))
    }

    fn model_id(&self) -> &str {
        "broken-scorer"
    }
}

pub fn row(id: i64, topic: &str, similarity: f64) -> Candidate {
    Candidate {
        id,
        content: format!("doc {} about {}", id, topic),
        topic: topic.to_string(),
        chunk_id: id,
        similarity,
    }
}

/// Configuration with fast retries and the given policy
pub fn test_config(policy: SearchPolicy) -> RagConfig {
    let mut config = RagConfig::default();
    config.retrieval.policy = policy;
    config.retry.backoff_ms = 1;
    config
}

/// Everything a test needs to build and inspect a pipeline
pub struct Harness {
    pub embedder: Arc<HashEmbedder>,
    pub store: Arc<FixtureStore>,
    pub provider: Arc<ScriptedProvider>,
    pub telemetry: PipelineTelemetry,
}

impl Harness {
    pub fn new(store: FixtureStore, provider: ScriptedProvider) -> Self {
        Self {
            embedder: Arc::new(HashEmbedder::new()),
            store: Arc::new(store),
            provider: Arc::new(provider),
            telemetry: PipelineTelemetry::new(),
        }
    }

    /// Pipeline without a scoring reranker
    pub fn pipeline(&self, config: &RagConfig) -> QueryPipeline {
        self.build(config, None)
    }

    /// Pipeline reranking with `scorer`
    pub fn reranking_pipeline(&self, config: &RagConfig, scorer: Arc<dyn RelevanceScorer>) -> QueryPipeline {
        let reranker = ModelReranker::new(scorer, config.reranker.batch_size).with_telemetry(self.telemetry.clone());
        self.build(config, Some(Arc::new(reranker)))
    }

    fn build(&self, config: &RagConfig, reranker: Option<Arc<dyn Reranker>>) -> QueryPipeline {
        let components = PipelineComponents {
            embedder: self.embedder.clone(),
            store: self.store.clone(),
            reranker,
            provider: self.provider.clone(),
        };
        QueryPipeline::new(components, config, self.telemetry.clone())
    }
}
