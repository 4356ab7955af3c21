//! Collaborator seams consumed by the pipeline.
//!
//! Blocking model inference stays synchronous (`Embedder`); everything that
//! talks to a remote service is async.

use async_trait::async_trait;

use crate::types::{CacheEntry, CategoryId, SkillFragment, VectorMatch};

pub trait Embedder: Send + Sync {
    /// Stable identifier for the model (e.g., `bge-m3:d1024`).
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    /// Must return L2-normalized vectors of length `dim()`, one per input.
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Opaque similarity-search service. `distance` is cosine distance.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Number of vectors in a collection; a missing collection counts as 0.
    async fn count(&self, collection_id: &str) -> anyhow::Result<usize>;
    async fn search(&self, collection_id: &str, vector: &[f32], k: usize) -> anyhow::Result<Vec<VectorMatch>>;
}

/// Scores `(query, passage)` pairs; higher is more relevant. Returns one
/// score per passage, in input order.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    fn name(&self) -> &str;
    async fn score(&self, query: &str, passages: &[String]) -> anyhow::Result<Vec<f32>>;
}

#[async_trait]
pub trait SkillsResolver: Send + Sync {
    async fn resolve_skills(&self, category_ids: &[CategoryId], message_text: &str) -> anyhow::Result<Vec<SkillFragment>>;
}

#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// `category_id = None` asks for global facts.
    async fn get_facts(&self, user_id: &str, category_id: Option<&str>) -> anyhow::Result<Vec<String>>;
}

/// Bidirectional acronym <-> phrase mapping, read once per call.
pub trait AcronymDictionary: Send + Sync {
    fn entries(&self) -> Vec<(String, String)>;
}

/// Backing store for memoized bundles. Implementations may be remote and
/// fail; callers treat failures as misses.
pub trait CacheStore: Send + Sync {
    fn get(&self, fingerprint: &str) -> anyhow::Result<Option<CacheEntry>>;
    fn put(&self, entry: CacheEntry) -> anyhow::Result<()>;
}
