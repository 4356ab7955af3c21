#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docrag_cache::{MemoryCacheStore, ResponseCache};
use docrag_core::traits::VectorStore;
use docrag_core::types::{Chunk, CollectionHits, Meta, VectorMatch};
use docrag_embed::FakeEmbedder;
use docrag_pipeline::RagPipeline;

/// Canned similarity search: returns each collection's hits in the given
/// order regardless of the query vector.
#[derive(Default)]
pub struct MockStore {
    collections: HashMap<String, Vec<VectorMatch>>,
    fail_count: HashSet<String>,
    fail_search: HashSet<String>,
    slow: HashMap<String, Duration>,
    pub searches: AtomicUsize,
}

impl MockStore {
    pub fn new() -> Self { Self::default() }

    /// `hits` are `(chunk id, document id, similarity)`.
    pub fn with_collection(mut self, collection: &str, hits: &[(&str, &str, f32)]) -> Self {
        let matches = hits
            .iter()
            .map(|(id, doc, sim)| {
                let mut metadata = Meta::new();
                metadata.insert("title".into(), format!("{doc}.pdf"));
                VectorMatch {
                    id: id.to_string(),
                    distance: 1.0 - sim,
                    source_document_id: doc.to_string(),
                    text: format!("passage {id}"),
                    page_or_section: Some("p. 1".into()),
                    metadata,
                }
            })
            .collect();
        self.collections.insert(collection.to_string(), matches);
        self
    }

    pub fn failing_count(mut self, collection: &str) -> Self {
        self.fail_count.insert(collection.to_string());
        self
    }

    pub fn failing_search(mut self, collection: &str) -> Self {
        self.fail_search.insert(collection.to_string());
        self
    }

    pub fn slow(mut self, collection: &str, delay: Duration) -> Self {
        self.slow.insert(collection.to_string(), delay);
        self
    }

    pub fn search_calls(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorStore for MockStore {
    async fn count(&self, collection_id: &str) -> anyhow::Result<usize> {
        if self.fail_count.contains(collection_id) {
            anyhow::bail!("count unavailable for {collection_id}");
        }
        Ok(self.collections.get(collection_id).map_or(0, Vec::len))
    }

    async fn search(&self, collection_id: &str, _vector: &[f32], k: usize) -> anyhow::Result<Vec<VectorMatch>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.slow.get(collection_id) {
            tokio::time::sleep(*delay).await;
        }
        if self.fail_search.contains(collection_id) {
            anyhow::bail!("search unavailable for {collection_id}");
        }
        let hits = self.collections.get(collection_id).ok_or_else(|| anyhow::anyhow!("no collection {collection_id}"))?;
        Ok(hits.iter().take(k).cloned().collect())
    }
}

pub fn pipeline_with(store: Arc<MockStore>) -> docrag_pipeline::RagPipelineBuilder {
    RagPipeline::builder(Arc::new(FakeEmbedder::new(16)), store)
}

pub fn memory_cache() -> (Arc<MemoryCacheStore>, Arc<ResponseCache>) {
    let store = Arc::new(MemoryCacheStore::new(100));
    let cache = Arc::new(ResponseCache::new(store.clone()));
    (store, cache)
}

pub fn chunk(id: &str, collection: &str, score: f32) -> Chunk {
    Chunk {
        id: id.into(),
        source_document_id: format!("doc-{id}"),
        collection_id: collection.into(),
        text: format!("passage {id}"),
        page_or_section: None,
        score,
        metadata: Default::default(),
    }
}

pub fn group(collection: &str, hits: &[(&str, f32)]) -> CollectionHits {
    CollectionHits { collection_id: collection.into(), hits: hits.iter().map(|(id, s)| chunk(id, collection, *s)).collect() }
}

pub fn ids(chunks: &[Chunk]) -> Vec<&str> {
    chunks.iter().map(|c| c.id.as_str()).collect()
}
