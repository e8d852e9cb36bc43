//! Local embedding provider using Candle and Qwen3-Embedding models
//!
//! Provides local inference for embedding generation with GPU acceleration:
//! - **local**: Qwen3-Embedding-0.6B (1024 dimensions)
//! - **local-4b**: Qwen3-Embedding-4B (2560 dimensions)
//!
//! GPU acceleration via compile-time features:
//! - `--features metal` for macOS Metal/MPS
//! - `--features cuda` for NVIDIA CUDA
//!
//! Qwen3-Embedding pools by taking the hidden state at each sequence's last
//! non-padding token, then L2-normalizes, rather than the mean-pooling a
//! BERT-style encoder would use.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::qwen3::{Config as Qwen3Config, Model as Qwen3Model};
use hf_hub::{api::sync::Api, Repo, RepoType};
use once_cell::sync::OnceCell;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer};
use tracing::{debug, info};

use super::provider::{EmbedOptions, EmbeddingProvider, ProgressCallback, ProviderKind};
use crate::error::{Result, SearchError};

const DTYPE: DType = DType::F32;
const DEFAULT_BATCH_SIZE: usize = 16;

#[derive(Debug, Clone)]
pub struct LocalModelSpec {
    pub model_id: &'static str,
    pub dimensions: usize,
    pub kind: ProviderKind,
}

impl LocalModelSpec {
    pub fn qwen3_0_6b() -> Self {
        Self { model_id: "Qwen/Qwen3-Embedding-0.6B", dimensions: 1024, kind: ProviderKind::Local }
    }

    pub fn qwen3_4b() -> Self {
        Self { model_id: "Qwen/Qwen3-Embedding-4B", dimensions: 2560, kind: ProviderKind::Local4b }
    }
}

/// `Arc<LocalProviderInner>` gives interior clonability, needed to move the
/// provider into a `spawn_blocking` task.
#[derive(Clone)]
pub struct LocalProvider {
    inner: Arc<LocalProviderInner>,
}

struct LocalProviderInner {
    spec: LocalModelSpec,
    model: OnceCell<LoadedModel>,
    device: Device,
    batch_size: usize,
}

struct LoadedModel {
    model: Qwen3Model,
    tokenizer: Tokenizer,
    device: Device,
}

impl LocalProvider {
    pub fn new(spec: LocalModelSpec) -> Result<Self> {
        let device = select_device()?;
        Ok(Self {
            inner: Arc::new(LocalProviderInner {
                spec,
                model: OnceCell::new(),
                device,
                batch_size: DEFAULT_BATCH_SIZE,
            }),
        })
    }

    pub fn with_device(spec: LocalModelSpec, device: Device) -> Self {
        Self {
            inner: Arc::new(LocalProviderInner { spec, model: OnceCell::new(), device, batch_size: DEFAULT_BATCH_SIZE }),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.model.get().is_some()
    }

    fn device_name(&self) -> String {
        match &self.inner.device {
            Device::Cpu => "CPU".to_string(),
            #[cfg(feature = "metal")]
            Device::Metal(_) => "Metal".to_string(),
            #[cfg(feature = "cuda")]
            Device::Cuda(_) => "CUDA".to_string(),
            #[allow(unreachable_patterns)]
            _ => "Unknown".to_string(),
        }
    }

    fn ensure_model(&self, progress_cb: &Option<ProgressCallback>) -> Result<&LoadedModel> {
        self.inner
            .model
            .get_or_try_init(|| load_model(&self.inner.spec, &self.inner.device, progress_cb))
    }

    fn embed_sync(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let texts_ref: Vec<&str> = texts.iter().map(String::as_str).collect();
        debug!("encoding {} texts with local model {}", texts_ref.len(), self.inner.spec.model_id);

        let loaded = self.ensure_model(&None)?;
        encode_with_model(&loaded.model, &loaded.tokenizer, &loaded.device, &texts_ref)
    }
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn dimensions(&self) -> usize {
        self.inner.spec.dimensions
    }

    fn kind(&self) -> ProviderKind {
        self.inner.spec.kind
    }

    async fn initialize(&self, progress_cb: Option<ProgressCallback>) -> Result<()> {
        let provider = self.clone();
        let start = Instant::now();

        tokio::task::spawn_blocking(move || provider.ensure_model(&progress_cb).map(|_| ()))
            .await
            .map_err(|e| SearchError::ProviderUnavailable(format!("warmup task panicked: {}", e)))??;

        info!("local embedding model ready in {:?}", start.elapsed());
        Ok(())
    }

    async fn embed(&self, texts: Vec<String>, options: EmbedOptions) -> Result<Vec<Option<Vec<f32>>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let batch_size = options.batch_size.unwrap_or(self.inner.batch_size);
        let mut out = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(batch_size) {
            let chunk = chunk.to_vec();
            let provider = self.clone();
            let vectors = tokio::task::spawn_blocking(move || provider.embed_sync(&chunk))
                .await
                .map_err(|e| SearchError::ProviderUnavailable(format!("encode task panicked: {}", e)))??;
            out.extend(vectors.into_iter().map(Some));
        }

        Ok(out)
    }
}

fn select_device() -> Result<Device> {
    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(device) => {
                info!("using Metal/MPS GPU acceleration");
                return Ok(device);
            }
            Err(e) => debug!("metal not available: {}", e),
        }
    }

    #[cfg(feature = "cuda")]
    {
        match Device::new_cuda(0) {
            Ok(device) => {
                info!("using CUDA GPU acceleration");
                return Ok(device);
            }
            Err(e) => debug!("cuda not available: {}", e),
        }
    }

    info!("using CPU (no GPU acceleration available)");
    Ok(Device::Cpu)
}

fn download_model_files(model_id: &str, progress_cb: &Option<ProgressCallback>) -> Result<(PathBuf, PathBuf, PathBuf)> {
    if let Some(cb) = progress_cb {
        cb(&format!("downloading {} (cached after first run)", model_id));
    }

    let api = Api::new().map_err(|e| SearchError::ProviderUnavailable(format!("failed to create HF API: {}", e)))?;
    let repo = Repo::with_revision(model_id.to_string(), RepoType::Model, "main".to_string());
    let api_repo = api.repo(repo);

    let config = api_repo
        .get("config.json")
        .map_err(|e| SearchError::ProviderUnavailable(format!("failed to download config.json: {}", e)))?;
    let tokenizer = api_repo
        .get("tokenizer.json")
        .map_err(|e| SearchError::ProviderUnavailable(format!("failed to download tokenizer.json: {}", e)))?;
    let weights = api_repo
        .get("model.safetensors")
        .map_err(|e| SearchError::ProviderUnavailable(format!("failed to download model.safetensors: {}", e)))?;

    Ok((config, tokenizer, weights))
}

fn load_model(spec: &LocalModelSpec, device: &Device, progress_cb: &Option<ProgressCallback>) -> Result<LoadedModel> {
    info!("loading local embedding model ({})...", spec.model_id);

    let (config_path, tokenizer_path, weights_path) = download_model_files(spec.model_id, progress_cb)?;

    if let Some(cb) = progress_cb {
        cb("parsing model config");
    }
    let config_str = std::fs::read_to_string(&config_path)
        .map_err(|e| SearchError::ProviderUnavailable(format!("failed to read config: {}", e)))?;
    let config: Qwen3Config = serde_json::from_str(&config_str)
        .map_err(|e| SearchError::ProviderUnavailable(format!("failed to parse config: {}", e)))?;

    if let Some(cb) = progress_cb {
        cb("loading tokenizer");
    }
    let tokenizer = Tokenizer::from_file(&tokenizer_path)
        .map_err(|e| SearchError::ProviderUnavailable(format!("failed to load tokenizer: {}", e)))?;

    if let Some(cb) = progress_cb {
        cb("loading model weights");
    }
    let vb = unsafe {
        VarBuilder::from_mmaped_safetensors(&[weights_path], DTYPE, device)
            .map_err(|e| SearchError::ProviderUnavailable(format!("failed to map weights: {}", e)))?
    };

    let model = Qwen3Model::new(&config, vb)
        .map_err(|e| SearchError::ProviderUnavailable(format!("failed to build model: {}", e)))?;

    info!("local embedding model loaded (dim={})", spec.dimensions);

    Ok(LoadedModel { model, tokenizer, device: device.clone() })
}

fn normalize_l2(v: &Tensor) -> Result<Tensor> {
    v.broadcast_div(&v.sqr()?.sum_keepdim(1)?.sqrt()?)
        .map_err(|e| SearchError::ProviderUnavailable(format!("L2 normalization failed: {}", e)))
}

/// Qwen3-Embedding pools at the last non-padding token per sequence, unlike
/// a BERT encoder's mean pool.
fn last_token_pool(hidden_states: &Tensor, attention_mask: &[Vec<u32>]) -> Result<Tensor> {
    let mut rows = Vec::with_capacity(attention_mask.len());
    for (row, mask) in attention_mask.iter().enumerate() {
        let last_idx = mask.iter().rposition(|&m| m == 1).unwrap_or(0);
        let row_tensor = hidden_states
            .get(row)
            .and_then(|t| t.get(last_idx))
            .map_err(|e| SearchError::ProviderUnavailable(format!("failed to index hidden state: {}", e)))?;
        rows.push(row_tensor);
    }

    Tensor::stack(&rows, 0).map_err(|e| SearchError::ProviderUnavailable(format!("failed to stack pooled rows: {}", e)))
}

fn encode_with_model(
    model: &Qwen3Model,
    tokenizer: &Tokenizer,
    device: &Device,
    texts: &[&str],
) -> Result<Vec<Vec<f32>>> {
    let mut tokenizer = tokenizer.clone();
    let padding = PaddingParams { strategy: PaddingStrategy::BatchLongest, ..Default::default() };
    tokenizer.with_padding(Some(padding));

    let encodings = tokenizer
        .encode_batch(texts.to_vec(), true)
        .map_err(|e| SearchError::ProviderUnavailable(format!("tokenization failed: {}", e)))?;

    let attention_masks: Vec<Vec<u32>> = encodings.iter().map(|enc| enc.get_attention_mask().to_vec()).collect();

    let token_id_tensors: Vec<Tensor> = encodings
        .iter()
        .map(|enc| Tensor::new(enc.get_ids(), device))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| SearchError::ProviderUnavailable(format!("failed to build token tensor: {}", e)))?;

    let mask_tensors: Vec<Tensor> = attention_masks
        .iter()
        .map(|mask| Tensor::new(mask.as_slice(), device))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| SearchError::ProviderUnavailable(format!("failed to build mask tensor: {}", e)))?;

    let token_ids = Tensor::stack(&token_id_tensors, 0)
        .map_err(|e| SearchError::ProviderUnavailable(format!("failed to stack tokens: {}", e)))?;
    let attention_mask = Tensor::stack(&mask_tensors, 0)
        .map_err(|e| SearchError::ProviderUnavailable(format!("failed to stack masks: {}", e)))?;

    let hidden_states = model
        .forward(&token_ids, 0, Some(&attention_mask))
        .map_err(|e| SearchError::ProviderUnavailable(format!("forward pass failed: {}", e)))?;

    let pooled = last_token_pool(&hidden_states, &attention_masks)?;
    let normalized = normalize_l2(&pooled)?;

    let result: Vec<Vec<f32>> = (0..normalized.dim(0).map_err(|e| SearchError::ProviderUnavailable(e.to_string()))?)
        .map(|i| normalized.get(i)?.to_vec1::<f32>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| SearchError::ProviderUnavailable(format!("failed to convert embeddings: {}", e)))?;

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_specs_have_expected_dimensions() {
        assert_eq!(LocalModelSpec::qwen3_0_6b().dimensions, 1024);
        assert_eq!(LocalModelSpec::qwen3_4b().dimensions, 2560);
        assert_eq!(LocalModelSpec::qwen3_0_6b().kind, ProviderKind::Local);
        assert_eq!(LocalModelSpec::qwen3_4b().kind, ProviderKind::Local4b);
    }

    #[test]
    fn provider_creation_selects_a_device() {
        let provider = LocalProvider::new(LocalModelSpec::qwen3_0_6b());
        assert!(provider.is_ok());
    }

    #[test]
    fn empty_input_short_circuits_without_loading_model() {
        let provider = LocalProvider::new(LocalModelSpec::qwen3_0_6b()).unwrap();
        let result = provider.embed_sync(&[]);
        assert!(result.is_ok());
        assert!(result.unwrap().is_empty());
        assert!(!provider.is_loaded());
    }

    #[tokio::test]
    #[ignore] // requires model download
    async fn embeds_text_end_to_end() {
        let provider = LocalProvider::new(LocalModelSpec::qwen3_0_6b()).unwrap();
        let vectors = provider
            .embed(vec!["hello world".to_string()], EmbedOptions::default())
            .await
            .unwrap();
        assert_eq!(vectors.len(), 1);
        assert_eq!(vectors[0].as_ref().unwrap().len(), 1024);
    }
}
