//! Local cross-encoder relevance scoring via candle
//!
//! A BERT sequence classifier (`bert.*` encoder, `bert.pooler.dense`,
//! `classifier`) reads the query and document as one pair. A single output
//! logit goes through a sigmoid; with two or more labels the softmax
//! probability of the last (relevant) label is used.

use async_trait::async_trait;
use candle_core::{DType, Device, Module, Tensor, D};
use candle_nn::{linear, Linear, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config};
use std::sync::Arc;
use tokenizers::Tokenizer;

use crate::config::RerankerConfig;
use crate::embedding::runtime::{fetch_bert_assets, HeadConfig, InferenceSlots, PaddedBatch};
use crate::errors::{RagError, Result};
use crate::reranking::RelevanceScorer;

struct ClassifierModel {
    bert: BertModel,
    pooler: Linear,
    classifier: Linear,
    labels: usize,
}

impl ClassifierModel {
    fn forward(&self, batch: &PaddedBatch) -> candle_core::Result<Vec<f32>> {
        let hidden = self.bert.forward(
            &batch.input_ids,
            &batch.token_type_ids,
            Some(&batch.attention_mask),
        )?;

        // [CLS] token
        let cls = hidden.narrow(1, 0, 1)?.squeeze(1)?;
        let pooled = self.pooler.forward(&cls)?.tanh()?;
        let logits = self.classifier.forward(&pooled)?;
        logits_to_scores(&logits, self.labels)
    }
}

/// Relevance scorer backed by an in-process cross-encoder
pub struct CrossEncoderScorer {
    model: Arc<ClassifierModel>,
    tokenizer: Arc<Tokenizer>,
    device: Device,
    model_id: String,
    slots: InferenceSlots,
}

impl CrossEncoderScorer {
    /// Load the configured cross-encoder (downloads on first use)
    pub async fn load(config: &RerankerConfig) -> Result<Self> {
        let model_id = config.model.clone();
        let max_tokens = config.max_tokens;

        tracing::info!(model = %model_id, "loading reranker model");
        let (model, tokenizer) =
            tokio::task::spawn_blocking(move || Self::load_blocking(&model_id, max_tokens))
                .await
                .map_err(|e| RagError::ModelUnavailable(format!("model loader panicked: {}", e)))??;
        tracing::info!(model = %config.model, labels = model.labels, "reranker model loaded");

        Ok(Self {
            model: Arc::new(model),
            tokenizer: Arc::new(tokenizer),
            device: Device::Cpu,
            model_id: config.model.clone(),
            slots: InferenceSlots::new(config.inference_slots),
        })
    }

    fn load_blocking(model_id: &str, max_tokens: usize) -> Result<(ClassifierModel, Tokenizer)> {
        let assets = fetch_bert_assets(model_id, max_tokens)?;
        let unavailable =
            |e: candle_core::Error| RagError::ModelUnavailable(format!("{}: {}", model_id, e));

        let config: Config = serde_json::from_str(&assets.config_json)?;
        let head: HeadConfig = serde_json::from_str(&assets.config_json)?;
        let labels = head.labels();

        // Safety: the weights file is not modified while mapped
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[assets.weights], DType::F32, &Device::Cpu)
                .map_err(unavailable)?
        };

        let bert = BertModel::load(vb.pp("bert"), &config).map_err(unavailable)?;
        let pooler = linear(head.hidden_size, head.hidden_size, vb.pp("bert.pooler.dense"))
            .map_err(unavailable)?;
        let classifier = linear(head.hidden_size, labels, vb.pp("classifier")).map_err(unavailable)?;

        Ok((
            ClassifierModel {
                bert,
                pooler,
                classifier,
                labels,
            },
            assets.tokenizer,
        ))
    }

    fn score_blocking(
        model: &ClassifierModel,
        tokenizer: &Tokenizer,
        device: &Device,
        pairs: Vec<(String, String)>,
    ) -> Result<Vec<f64>> {
        let encodings = tokenizer
            .encode_batch(pairs, true)
            .map_err(|e| RagError::Rerank(format!("Tokenization failed: {}", e)))?;

        let batch = PaddedBatch::from_encodings(&encodings, device)
            .map_err(|e| RagError::Rerank(e.to_string()))?;
        let scores = model
            .forward(&batch)
            .map_err(|e| RagError::Rerank(format!("Reranker inference failed: {}", e)))?;

        Ok(scores.into_iter().map(f64::from).collect())
    }
}

#[async_trait]
impl RelevanceScorer for CrossEncoderScorer {
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f64>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let pairs: Vec<(String, String)> = documents
            .iter()
            .map(|doc| (query.to_string(), doc.clone()))
            .collect();

        let model = self.model.clone();
        let tokenizer = self.tokenizer.clone();
        let device = self.device.clone();

        self.slots
            .run(move || Self::score_blocking(&model, &tokenizer, &device, pairs))
            .await
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Probability of the relevant label for each row of `[batch, labels]` logits
fn logits_to_scores(logits: &Tensor, labels: usize) -> candle_core::Result<Vec<f32>> {
    let relevant = if labels == 1 {
        candle_nn::ops::sigmoid(logits)?
    } else {
        candle_nn::ops::softmax(logits, D::Minus1)?.narrow(1, labels - 1, 1)?
    };
    relevant.squeeze(1)?.to_vec1::<f32>()
}
