use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use candle_core::{Device, Tensor};
use candle_transformers::models::xlm_roberta::XLMRobertaForSequenceClassification;
use tokenizers::Tokenizer;

use docrag_core::traits::RelevanceScorer;
use docrag_embed::{env_flag, resolve_model_dir, select_device, tokenize_batch, ModelFiles};

use crate::lexical::LexicalScorer;

const RERANK_MAX_LEN: usize = 512;
const RERANK_BATCH: usize = 16;

struct Inner {
    model: XLMRobertaForSequenceClassification,
    tokenizer: Tokenizer,
    device: Device,
}

impl Inner {
    fn score_pairs(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        let mut out = Vec::with_capacity(passages.len());
        for batch in passages.chunks(RERANK_BATCH) {
            let pairs: Vec<(&str, &str)> = batch.iter().map(|p| (query, p.as_str())).collect();
            let (input_ids, attention_mask) = tokenize_batch(&self.tokenizer, pairs, RERANK_MAX_LEN, &self.device)?;
            let token_type_ids = input_ids.zeros_like()?;
            let logits: Tensor = self.model.forward(&input_ids, &attention_mask, &token_type_ids)?;
            let logits: Vec<f32> = logits.flatten_all()?.to_device(&Device::Cpu)?.to_vec1()?;
            out.extend(logits.into_iter().map(|x| 1.0 / (1.0 + (-x).exp())));
        }
        Ok(out)
    }
}

/// Local cross-encoder (bge-reranker family) scoring `(query, passage)`
/// pairs; the score is the sigmoid of the single relevance logit.
pub struct CrossEncoderScorer {
    inner: Arc<Inner>,
    name: String,
}

impl CrossEncoderScorer {
    pub fn load(model_dir: &Path) -> Result<Self> {
        let device = select_device();
        tracing::info!(dir = %model_dir.display(), "loading cross-encoder");
        let files = ModelFiles::load(model_dir, &device)?;
        let model = XLMRobertaForSequenceClassification::new(1, &files.config, files.vb)?;
        let dir_name = model_dir.file_name().map_or_else(|| "model".to_string(), |n| n.to_string_lossy().to_string());
        Ok(Self {
            inner: Arc::new(Inner { model, tokenizer: files.tokenizer, device }),
            name: format!("cross-encoder:{dir_name}"),
        })
    }
}

#[async_trait]
impl RelevanceScorer for CrossEncoderScorer {
    fn name(&self) -> &str { &self.name }

    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        let inner = self.inner.clone();
        let query = query.to_string();
        let passages = passages.to_vec();
        tokio::task::spawn_blocking(move || inner.score_pairs(&query, &passages))
            .await
            .map_err(|e| anyhow!("cross-encoder task failed: {e}"))?
    }
}

/// Local scorer for this process: the lexical scorer when
/// `APP_USE_FAKE_RERANKER` is set or no model can be loaded, otherwise the
/// cross-encoder from `model_dir` (or the usual model locations).
pub fn get_default_local_scorer(model_dir: Option<&str>) -> Arc<dyn RelevanceScorer> {
    if env_flag("APP_USE_FAKE_RERANKER") {
        tracing::info!("using LexicalScorer");
        return Arc::new(LexicalScorer::new());
    }
    let dir = match model_dir {
        Some(d) => Ok(docrag_core::config::expand_path(d)),
        None => resolve_model_dir(&["APP_RERANKER_DIR"], "bge-reranker"),
    };
    match dir.and_then(|d| CrossEncoderScorer::load(&d)) {
        Ok(scorer) => Arc::new(scorer),
        Err(e) => {
            tracing::warn!(error = %e, "cross-encoder unavailable, falling back to lexical scoring");
            Arc::new(LexicalScorer::new())
        }
    }
}
