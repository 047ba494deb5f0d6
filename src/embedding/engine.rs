//! Local sentence embeddings via candle
//!
//! BERT-family model from the Hugging Face hub, attention-mask mean pooling,
//! then L2 normalisation so dot product equals cosine similarity.

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use std::sync::Arc;
use tokenizers::Tokenizer;

use crate::config::EmbeddingConfig;
use crate::embedding::runtime::{fetch_bert_assets, HeadConfig, InferenceSlots, PaddedBatch};
use crate::embedding::{check_batch, embed_in_batches, ensure_not_blank, Embedder};
use crate::errors::{RagError, Result};
use crate::types::EmbeddingVector;

/// Embedding engine backed by an in-process BERT model
pub struct CandleEmbedder {
    model: Arc<BertModel>,
    tokenizer: Arc<Tokenizer>,
    device: Device,
    dimension: usize,
    model_id: String,
    slots: InferenceSlots,
    batch_size: usize,
}

impl CandleEmbedder {
    /// Load the configured model (downloads on first use)
    ///
    /// Failure here is fatal at startup.
    pub async fn load(config: &EmbeddingConfig) -> Result<Self> {
        let model_id = config.model.clone();
        let max_tokens = config.max_tokens;

        tracing::info!(model = %model_id, "loading embedding model");
        let (model, tokenizer, dimension) =
            tokio::task::spawn_blocking(move || Self::load_blocking(&model_id, max_tokens))
                .await
                .map_err(|e| RagError::ModelUnavailable(format!("model loader panicked: {}", e)))??;
        tracing::info!(model = %config.model, dimension, "embedding model loaded");

        Ok(Self {
            model: Arc::new(model),
            tokenizer: Arc::new(tokenizer),
            device: Device::Cpu,
            dimension,
            model_id: config.model.clone(),
            slots: InferenceSlots::new(config.inference_slots),
            batch_size: config.batch_size.max(1),
        })
    }

    fn load_blocking(model_id: &str, max_tokens: usize) -> Result<(BertModel, Tokenizer, usize)> {
        let assets = fetch_bert_assets(model_id, max_tokens)?;
        let unavailable =
            |e: candle_core::Error| RagError::ModelUnavailable(format!("{}: {}", model_id, e));

        let config: Config = serde_json::from_str(&assets.config_json)?;
        let head: HeadConfig = serde_json::from_str(&assets.config_json)?;

        // Safety: the weights file is not modified while mapped
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[assets.weights], DType::F32, &Device::Cpu)
                .map_err(unavailable)?
        };
        let model = BertModel::load(vb, &config).map_err(unavailable)?;

        Ok((model, assets.tokenizer, head.hidden_size))
    }

    /// Tokenize, run the model and pool; blocking
    fn encode(
        model: &BertModel,
        tokenizer: &Tokenizer,
        device: &Device,
        texts: Vec<String>,
    ) -> Result<Vec<EmbeddingVector>> {
        let encodings = tokenizer
            .encode_batch(texts, true)
            .map_err(|e| RagError::ModelUnavailable(format!("Tokenization failed: {}", e)))?;

        let forward = || -> candle_core::Result<Vec<Vec<f32>>> {
            let batch = PaddedBatch::from_encodings(&encodings, device)?;
            let hidden = model.forward(
                &batch.input_ids,
                &batch.token_type_ids,
                Some(&batch.attention_mask),
            )?;
            let pooled = Self::mean_pool(&hidden, &batch.attention_mask)?;
            Self::l2_normalize(&pooled)?.to_vec2::<f32>()
        };

        forward().map_err(|e| RagError::ModelUnavailable(format!("Embedding inference failed: {}", e)))
    }

    /// Mean pooling with attention mask
    fn mean_pool(embeddings: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor> {
        let mask_expanded = attention_mask
            .unsqueeze(2)?
            .expand(embeddings.shape())?
            .to_dtype(embeddings.dtype())?;

        let sum_embeddings = (embeddings * &mask_expanded)?.sum(1)?;
        let sum_mask = mask_expanded.sum(1)?.clamp(1e-9, f64::MAX)?;

        sum_embeddings.broadcast_div(&sum_mask)
    }

    fn l2_normalize(pooled: &Tensor) -> candle_core::Result<Tensor> {
        let norms = pooled.sqr()?.sum_keepdim(1)?.sqrt()?.clamp(1e-12, f64::MAX)?;
        pooled.broadcast_div(&norms)
    }
}

#[async_trait]
impl Embedder for CandleEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        for text in texts {
            ensure_not_blank(text)?;
        }

        let vectors = embed_in_batches(texts, self.batch_size, move |batch| {
            let model = self.model.clone();
            let tokenizer = self.tokenizer.clone();
            let device = self.device.clone();
            self.slots.run(move || Self::encode(&model, &tokenizer, &device, batch))
        })
        .await?;

        check_batch(&vectors, texts.len(), self.dimension)?;
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
