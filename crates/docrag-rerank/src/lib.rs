//! Second-pass relevance scoring.
//!
//! Providers implement `RelevanceScorer`. `rerank` applies one to a ranked
//! list and falls back to the input ordering whenever the provider cannot
//! produce a complete set of scores in time.

use std::sync::Arc;
use std::time::Duration;

use docrag_core::traits::RelevanceScorer;
use docrag_core::types::{Chunk, RerankProvider};

mod config;
mod cross_encoder;
mod lexical;
mod remote;

pub use config::RerankConfig;
pub use cross_encoder::{get_default_local_scorer, CrossEncoderScorer};
pub use lexical::LexicalScorer;
pub use remote::RemoteReranker;

#[derive(Debug, Clone, PartialEq)]
pub struct RerankOutcome {
    pub chunks: Vec<Chunk>,
    /// False when the input ordering was returned untouched.
    pub applied: bool,
}

/// Rescore `chunks` against `query` in a single batch call.
///
/// The chunk-id set is never changed. Scores are written back by index and
/// the list is stably re-sorted by descending score.
pub async fn rerank(query: &str, chunks: Vec<Chunk>, scorer: &dyn RelevanceScorer, timeout: Duration) -> RerankOutcome {
    if chunks.is_empty() {
        return RerankOutcome { chunks, applied: false };
    }
    let passages: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let scores = match tokio::time::timeout(timeout, scorer.score(query, &passages)).await {
        Ok(Ok(scores)) => scores,
        Ok(Err(e)) => {
            tracing::warn!(scorer = scorer.name(), error = %e, "rerank failed, keeping similarity order");
            return RerankOutcome { chunks, applied: false };
        }
        Err(_) => {
            tracing::warn!(scorer = scorer.name(), timeout_ms = timeout.as_millis() as u64, "rerank timed out, keeping similarity order");
            return RerankOutcome { chunks, applied: false };
        }
    };
    if scores.len() != chunks.len() || scores.iter().any(|s| !s.is_finite()) {
        tracing::warn!(
            scorer = scorer.name(),
            expected = chunks.len(),
            got = scores.len(),
            "rerank returned unusable scores, keeping similarity order"
        );
        return RerankOutcome { chunks, applied: false };
    }

    let mut chunks = chunks;
    for (chunk, score) in chunks.iter_mut().zip(scores) {
        chunk.score = score;
    }
    chunks.sort_by(|a, b| b.score.total_cmp(&a.score));
    tracing::debug!(scorer = scorer.name(), n = chunks.len(), "reranked");
    RerankOutcome { chunks, applied: true }
}

/// The providers available to a pipeline; one is chosen per call.
#[derive(Clone)]
pub struct RerankerSet {
    remote: Option<Arc<dyn RelevanceScorer>>,
    local: Arc<dyn RelevanceScorer>,
}

impl RerankerSet {
    pub fn new(local: Arc<dyn RelevanceScorer>) -> Self {
        Self { remote: None, local }
    }

    pub fn with_remote(mut self, remote: Arc<dyn RelevanceScorer>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Build from the `rerank` config section. The remote provider is only
    /// registered when both `base_url` and `api_key` are set.
    pub fn from_config(cfg: &RerankConfig) -> anyhow::Result<Self> {
        let local = get_default_local_scorer(cfg.model_dir.as_deref());
        let mut set = Self::new(local);
        if let (Some(base_url), Some(api_key)) = (cfg.base_url.as_deref(), cfg.api_key.as_deref()) {
            let remote = RemoteReranker::new(base_url, &cfg.model, api_key, cfg.timeout())?;
            set = set.with_remote(Arc::new(remote));
        }
        Ok(set)
    }

    pub fn select(&self, provider: RerankProvider) -> Arc<dyn RelevanceScorer> {
        match (provider, &self.remote) {
            (RerankProvider::Remote, Some(remote)) => remote.clone(),
            (RerankProvider::Remote, None) => {
                tracing::debug!("remote reranker requested but not configured, using local");
                self.local.clone()
            }
            (RerankProvider::Local, _) => self.local.clone(),
        }
    }
}
