//! Shared plumbing for in-process candle models
//!
//! - [`InferenceSlots`]: bounded gate in front of the blocking thread pool;
//!   one slot turns a model into a single-slot execution queue
//! - [`BertAssets`]: config, tokenizer and weights fetched from the hub
//! - [`PaddedBatch`]: right-padded id / type-id / mask tensors for a batch

use candle_core::{Device, Tensor};
use hf_hub::{api::sync::Api, Repo, RepoType};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokenizers::{Encoding, Tokenizer, TruncationParams, TruncationStrategy};
use tokio::sync::Semaphore;

use crate::errors::{RagError, Result};

/// Bounded access to blocking model inference
#[derive(Debug, Clone)]
pub struct InferenceSlots {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl InferenceSlots {
    /// Create a gate admitting `capacity` concurrent jobs (minimum one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Run a CPU-bound job on the blocking pool once a slot is free
    ///
    /// The slot is held until the job finishes, even if the caller stops
    /// waiting for the result.
    pub async fn run<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| RagError::ModelUnavailable("inference queue closed".to_string()))?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await
        .map_err(|e| RagError::ModelUnavailable(format!("inference task failed: {}", e)))?
    }

    /// Slots not currently in use
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Model files resolved from the Hugging Face hub
pub struct BertAssets {
    pub config_json: String,
    pub tokenizer: Tokenizer,
    pub weights: PathBuf,
}

/// Subset of a BERT `config.json` needed outside candle's own config
#[derive(Debug, Clone, Deserialize)]
pub struct HeadConfig {
    pub hidden_size: usize,
    #[serde(default)]
    pub num_labels: Option<usize>,
    #[serde(default)]
    pub id2label: Option<std::collections::HashMap<String, String>>,
}

impl HeadConfig {
    /// Classifier outputs; `id2label` wins when `num_labels` is absent
    pub fn labels(&self) -> usize {
        self.num_labels
            .or_else(|| self.id2label.as_ref().map(|labels| labels.len()))
            .unwrap_or(1)
    }
}

/// Download (or reuse cached) model files; blocking
pub fn fetch_bert_assets(model_id: &str, max_tokens: usize) -> Result<BertAssets> {
    let unavailable = |what: &str, err: &dyn std::fmt::Display| {
        RagError::ModelUnavailable(format!("{} for {}: {}", what, model_id, err))
    };

    let api = Api::new().map_err(|e| unavailable("Failed to create HuggingFace API client", &e))?;
    let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));

    let config_path = repo
        .get("config.json")
        .map_err(|e| unavailable("Failed to download model config", &e))?;
    let tokenizer_path = repo
        .get("tokenizer.json")
        .map_err(|e| unavailable("Failed to download tokenizer", &e))?;
    let weights = repo
        .get("model.safetensors")
        .map_err(|e| unavailable("Failed to download model weights", &e))?;

    let config_json = std::fs::read_to_string(config_path)?;

    let mut tokenizer =
        Tokenizer::from_file(tokenizer_path).map_err(|e| unavailable("Failed to load tokenizer", &e))?;
    tokenizer.with_padding(None);
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: max_tokens,
            strategy: TruncationStrategy::LongestFirst,
            ..Default::default()
        }))
        .map_err(|e| unavailable("Failed to configure truncation", &e))?;

    Ok(BertAssets {
        config_json,
        tokenizer,
        weights,
    })
}

/// Right-padded batch ready for a BERT forward pass
pub struct PaddedBatch {
    pub input_ids: Tensor,
    pub token_type_ids: Tensor,
    pub attention_mask: Tensor,
}

impl PaddedBatch {
    /// Pad encodings to the longest sequence in the batch
    pub fn from_encodings(encodings: &[Encoding], device: &Device) -> candle_core::Result<Self> {
        let batch_size = encodings.len();
        let max_len = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);

        let mut ids = vec![0u32; batch_size * max_len];
        let mut type_ids = vec![0u32; batch_size * max_len];
        let mut mask = vec![0u32; batch_size * max_len];

        for (row, encoding) in encodings.iter().enumerate() {
            let offset = row * max_len;
            let len = encoding.get_ids().len();
            ids[offset..offset + len].copy_from_slice(encoding.get_ids());
            type_ids[offset..offset + len].copy_from_slice(encoding.get_type_ids());
            mask[offset..offset + len].copy_from_slice(encoding.get_attention_mask());
        }

        Ok(Self {
            input_ids: Tensor::from_vec(ids, (batch_size, max_len), device)?,
            token_type_ids: Tensor::from_vec(type_ids, (batch_size, max_len), device)?,
            attention_mask: Tensor::from_vec(mask, (batch_size, max_len), device)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_single_slot_serializes_jobs() {
        let slots = InferenceSlots::new(1);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let jobs: Vec<_> = (0..4)
            .map(|_| {
                let slots = slots.clone();
                let running = running.clone();
                let peak = peak.clone();
                tokio::spawn(async move {
                    slots
                        .run(move || {
                            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            std::thread::sleep(std::time::Duration::from_millis(20));
                            running.fetch_sub(1, Ordering::SeqCst);
                            Ok(())
                        })
                        .await
                })
            })
            .collect();

        for job in jobs {
            job.await.unwrap().unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(slots.available(), 1);
    }

    #[tokio::test]
    async fn test_job_error_propagates() {
        let slots = InferenceSlots::new(2);
        let result: Result<()> = slots
            .run(|| Err(RagError::ModelUnavailable("forward failed".to_string())))
            .await;

        assert!(matches!(result, Err(RagError::ModelUnavailable(_))));
        assert_eq!(slots.available(), 2);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        assert_eq!(InferenceSlots::new(0).capacity(), 1);
    }

    #[test]
    fn test_head_config_labels() {
        let head: HeadConfig = serde_json::from_str(r#"{"hidden_size": 384}"#).unwrap();
        assert_eq!(head.labels(), 1);

        let head: HeadConfig = serde_json::from_str(
            r#"{"hidden_size": 384, "id2label": {"0": "no", "1": "yes"}}"#,
        )
        .unwrap();
        assert_eq!(head.labels(), 2);
    }
}
