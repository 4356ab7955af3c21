//! Domain types shared by the retrieval pipeline and its adapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::error::{Error, Result};

pub type ChunkId = String;
pub type CategoryId = String;
pub type CollectionId = String;
/// Ordered so that serialized chunks (and therefore cache fingerprints and
/// fixtures) are byte-stable.
pub type Meta = BTreeMap<String, String>;

/// Upper bound on the number of query variants, original included.
pub const MAX_QUERY_EXPANSIONS: usize = 3;

/// Metadata key holding a human-readable document name.
pub const META_TITLE: &str = "title";

/// Convert a cosine distance in `[0, 2]` reported by the vector store into a
/// similarity where higher is better.
///
/// This is the only place the distance convention is encoded. A store that
/// switches metric must change this function, not its callers.
pub fn similarity_from_cosine_distance(distance: f32) -> f32 {
    1.0 - distance
}

/// One row returned by a similarity search call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    pub id: ChunkId,
    pub distance: f32,
    pub source_document_id: String,
    pub text: String,
    pub page_or_section: Option<String>,
    #[serde(default)]
    pub metadata: Meta,
}

/// Smallest retrievable unit of document text.
///
/// - `id`: dedup key, never rewritten by the pipeline
/// - `collection_id`: the collection this occurrence was found in
/// - `score`: similarity, later possibly overwritten by a reranker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub source_document_id: String,
    pub collection_id: CollectionId,
    pub text: String,
    pub page_or_section: Option<String>,
    pub score: f32,
    #[serde(default)]
    pub metadata: Meta,
}

impl Chunk {
    pub fn from_match(collection_id: &str, m: VectorMatch) -> Self {
        Self {
            score: similarity_from_cosine_distance(m.distance),
            id: m.id,
            source_document_id: m.source_document_id,
            collection_id: collection_id.to_string(),
            text: m.text,
            page_or_section: m.page_or_section,
            metadata: m.metadata,
        }
    }

    pub fn document_name(&self) -> &str {
        self.metadata.get(META_TITLE).map_or(self.source_document_id.as_str(), String::as_str)
    }
}

/// A physical similarity-search collection selected for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDescriptor {
    pub collection_id: CollectionId,
    /// `None` marks the global collection.
    pub category_id: Option<CategoryId>,
    pub vector_count: usize,
}

impl CollectionDescriptor {
    pub fn is_global(&self) -> bool {
        self.category_id.is_none()
    }
}

/// Hits returned by one collection for one query variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionHits {
    pub collection_id: CollectionId,
    pub hits: Vec<Chunk>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RerankProvider {
    Remote,
    #[default]
    Local,
}

/// Per-call configuration snapshot. The pipeline never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k_per_collection: usize,
    pub similarity_threshold: f32,
    pub max_context_chunks: usize,
    pub query_expansion_enabled: bool,
    pub rerank_enabled: bool,
    pub rerank_provider: RerankProvider,
    pub cache_enabled: bool,
    pub cache_ttl_seconds: u64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k_per_collection: 5,
            similarity_threshold: 0.25,
            max_context_chunks: 4,
            query_expansion_enabled: true,
            rerank_enabled: false,
            rerank_provider: RerankProvider::Local,
            cache_enabled: true,
            cache_ttl_seconds: 300,
        }
    }
}

impl RetrievalSettings {
    pub fn validate(&self) -> Result<()> {
        if self.similarity_threshold.is_nan() || !(-1.0..=1.0).contains(&self.similarity_threshold) {
            return Err(Error::InvalidConfig(format!(
                "similarity_threshold must be within [-1, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.top_k_per_collection == 0 {
            return Err(Error::InvalidConfig("top_k_per_collection must be > 0".into()));
        }
        if self.max_context_chunks == 0 {
            return Err(Error::InvalidConfig("max_context_chunks must be > 0".into()));
        }
        Ok(())
    }
}

/// A prompt fragment contributed by a triggered skill.
///
/// A skill with `pinned_document_ids` is an index skill: chunks from those
/// documents survive budget truncation ahead of better-ranked chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillFragment {
    pub skill_id: String,
    pub name: String,
    pub prompt: String,
    #[serde(default)]
    pub pinned_document_ids: Vec<String>,
}

impl SkillFragment {
    pub fn is_index(&self) -> bool {
        !self.pinned_document_ids.is_empty()
    }
}

/// Stored user facts, scoped to one category or global.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryBlock {
    pub scope: Option<CategoryId>,
    pub facts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub chunk_id: ChunkId,
    pub source_document_id: String,
    pub document_name: String,
    pub location: Option<String>,
    pub collection_id: CollectionId,
    pub score: f32,
}

impl Citation {
    pub fn for_chunk(chunk: &Chunk) -> Self {
        Self {
            chunk_id: chunk.id.clone(),
            source_document_id: chunk.source_document_id.clone(),
            document_name: chunk.document_name().to_string(),
            location: chunk.page_or_section.clone(),
            collection_id: chunk.collection_id.clone(),
            score: chunk.score,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleMetrics {
    pub latency_ms: u64,
    /// Chunks kept in the bundle.
    pub chunks_retrieved: usize,
    /// Deduplicated chunks that passed the threshold, before the budget cut.
    pub candidates_considered: usize,
    pub avg_similarity: f32,
    pub collections_queried: usize,
    pub collections_failed: usize,
    pub reranked: bool,
}

/// Pipeline output handed to the answer-generation stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextBundle {
    pub chunks: Vec<Chunk>,
    pub citations: Vec<Citation>,
    pub injected_skills: Vec<SkillFragment>,
    pub injected_memory: Option<MemoryBlock>,
    pub expanded_queries: Vec<String>,
    pub metrics: BundleMetrics,
}

impl ContextBundle {
    /// Render the bundle as LLM context: skill prompts, numbered sources, then
    /// the memory block.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for skill in &self.injected_skills {
            out.push_str(skill.prompt.trim());
            out.push_str("\n\n");
        }
        if !self.chunks.is_empty() {
            out.push_str("Context:\n");
            for (i, (chunk, citation)) in self.chunks.iter().zip(&self.citations).enumerate() {
                let _ = write!(out, "[{}] {}", i + 1, citation.document_name);
                if let Some(loc) = &citation.location {
                    let _ = write!(out, " ({loc})");
                }
                out.push('\n');
                out.push_str(chunk.text.trim());
                out.push_str("\n\n");
            }
        }
        if let Some(memory) = &self.injected_memory {
            match &memory.scope {
                Some(category) => {
                    let _ = writeln!(out, "Memory ({category}):");
                }
                None => out.push_str("Memory (global):\n"),
            }
            for fact in &memory.facts {
                let _ = writeln!(out, "- {fact}");
            }
        }
        out.trim_end().to_string()
    }
}

/// A memoized pipeline result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub bundle: ContextBundle,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
