//! Local embedding models on candle.
//!
//! `EmbeddingModel` runs BGE-M3 (XLM-RoBERTa) with masked mean pooling.
//! `FakeEmbedder` hashes tokens into a normalized vector; set
//! `APP_USE_FAKE_EMBEDDINGS=1` to get it from `get_default_embedder`.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;

use docrag_core::traits::Embedder;

mod device;
mod pool;
mod tokenize;

pub use device::select_device;
pub use pool::masked_mean_l2;
pub use tokenize::{tokenize_batch, PAD_ID};

pub const BGE_M3_DIM: usize = 1024;
const BGE_M3_MAX_LEN: usize = 256;

/// Everything needed to run an XLM-RoBERTa checkpoint from a local directory
/// holding `tokenizer.json`, `config.json` and `pytorch_model.bin`.
pub struct ModelFiles {
    pub tokenizer: Tokenizer,
    pub config: XLMRobertaConfig,
    pub vb: VarBuilder<'static>,
}

impl ModelFiles {
    pub fn load(model_dir: &Path, device: &Device) -> Result<Self> {
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let config_path = model_dir.join("config.json");
        let config: XLMRobertaConfig = serde_json::from_str(
            &std::fs::read_to_string(&config_path).with_context(|| format!("reading {}", config_path.display()))?,
        )?;
        let weights_path = model_dir.join("pytorch_model.bin");
        let weights: HashMap<String, Tensor> = candle_core::pickle::read_all(&weights_path)
            .with_context(|| format!("reading {}", weights_path.display()))?
            .into_iter()
            .collect();
        let vb = VarBuilder::from_tensors(weights, DType::F32, device);
        Ok(Self { tokenizer, config, vb })
    }
}

pub struct EmbeddingModel {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    id: String,
}

impl EmbeddingModel {
    pub fn load(model_dir: &Path) -> Result<Self> {
        let device = select_device();
        tracing::info!(dir = %model_dir.display(), "loading BGE-M3 embedding model");
        let files = ModelFiles::load(model_dir, &device)?;
        let model = XLMRobertaModel::new(&files.config, files.vb)?;
        let id = format!("bge-m3:d{BGE_M3_DIM}");
        tracing::info!(model = %id, "embedding model ready");
        Ok(Self { model, tokenizer: files.tokenizer, device, id })
    }
}

impl Embedder for EmbeddingModel {
    fn model_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { BGE_M3_DIM }
    fn max_len(&self) -> usize { BGE_M3_MAX_LEN }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let (input_ids, attention_mask) = tokenize_batch(&self.tokenizer, inputs, BGE_M3_MAX_LEN, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let out: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_vec2()?;
        if start.elapsed().as_millis() > 100 {
            tracing::debug!(batch = texts.len(), elapsed_ms = start.elapsed().as_millis() as u64, "slow embedding batch");
        }
        Ok(out)
    }
}

/// Deterministic token-hashing embedder for tests and development.
pub struct FakeEmbedder {
    dim: usize,
    id: String,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim, id: format!("fake:d{dim}") }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;

        let mut v = vec![0f32; self.dim];
        for token in text.split_whitespace() {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            v[idx] += 0.5 + (((h >> 32) as u32) as f32) / (u32::MAX as f32);
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        v
    }
}

impl Embedder for FakeEmbedder {
    fn model_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { usize::MAX }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

pub fn env_flag(name: &str) -> bool {
    std::env::var(name).ok().is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

pub fn get_default_embedder() -> Result<Arc<dyn Embedder>> {
    if env_flag("APP_USE_FAKE_EMBEDDINGS") {
        tracing::info!("using FakeEmbedder");
        return Ok(Arc::new(FakeEmbedder::new(BGE_M3_DIM)));
    }
    let dir = resolve_model_dir(&["APP_MODEL_DIR", "MODEL_DIR"], "bge-m3")?;
    Ok(Arc::new(EmbeddingModel::load(&dir)?))
}

/// Locate a model directory: the first existing path named by `env_keys`,
/// then `../models/<name>`, then `models/<name>`.
pub fn resolve_model_dir(env_keys: &[&str], name: &str) -> Result<PathBuf> {
    for key in env_keys {
        if let Ok(dir) = std::env::var(key) {
            let p = PathBuf::from(&dir);
            if p.exists() {
                tracing::debug!(env = key, dir = %p.display(), "model dir from env");
                return Ok(p);
            }
        }
    }
    for candidate in [Path::new("../models").join(name), Path::new("models").join(name)] {
        if candidate.exists() {
            tracing::debug!(dir = %candidate.display(), "model dir");
            return Ok(candidate);
        }
    }
    Err(anyhow!("Could not locate model directory for {name}"))
}
