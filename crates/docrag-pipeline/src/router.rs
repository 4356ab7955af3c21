//! Collection selection and concurrent similarity search.

use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use docrag_core::traits::VectorStore;
use docrag_core::types::{CategoryId, Chunk, CollectionDescriptor, CollectionHits};

/// The `pipeline` config section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Budget for every single collaborator call.
    pub call_timeout_ms: u64,
    pub max_concurrent_searches: usize,
    pub global_collection: String,
    pub category_collection_prefix: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            call_timeout_ms: 10_000,
            max_concurrent_searches: 8,
            global_collection: "global".to_string(),
            category_collection_prefix: "category_".to_string(),
        }
    }
}

impl PipelineOptions {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RouteOutcome {
    pub descriptors: Vec<CollectionDescriptor>,
    /// Collections whose size could not be determined.
    pub failed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    /// One entry per `(variant, collection)` call, in that order.
    pub results: Vec<CollectionHits>,
    pub succeeded_calls: usize,
    pub failed_calls: usize,
    /// Distinct collections with at least one failed call.
    pub failed_collections: usize,
}

pub struct CollectionRouter {
    store: Arc<dyn VectorStore>,
    options: PipelineOptions,
}

impl CollectionRouter {
    pub fn new(store: Arc<dyn VectorStore>, options: PipelineOptions) -> Self {
        Self { store, options }
    }

    pub fn collection_for(&self, category: Option<&str>) -> String {
        match category {
            Some(id) => format!("{}{}", self.options.category_collection_prefix, id),
            None => self.options.global_collection.clone(),
        }
    }

    /// Global collection first, then permitted categories in sorted order.
    /// Missing and empty collections are skipped.
    pub async fn route(&self, permitted: &[CategoryId]) -> RouteOutcome {
        let categories: BTreeSet<&str> = permitted.iter().map(String::as_str).collect();
        let candidates: Vec<(String, Option<CategoryId>)> = std::iter::once((self.collection_for(None), None))
            .chain(categories.into_iter().map(|c| (self.collection_for(Some(c)), Some(c.to_string()))))
            .collect();

        let timeout = self.options.call_timeout();
        let counts = futures::future::join_all(candidates.iter().map(|(collection_id, _)| {
            let store = self.store.clone();
            async move { tokio::time::timeout(timeout, store.count(collection_id)).await }
        }))
        .await;

        let mut outcome = RouteOutcome::default();
        for ((collection_id, category_id), count) in candidates.into_iter().zip(counts) {
            match count {
                Ok(Ok(0)) => tracing::debug!(collection = %collection_id, "skipping empty collection"),
                Ok(Ok(vector_count)) => outcome.descriptors.push(CollectionDescriptor { collection_id, category_id, vector_count }),
                Ok(Err(e)) => {
                    tracing::warn!(collection = %collection_id, error = %e, "collection count failed, skipping");
                    outcome.failed += 1;
                }
                Err(_) => {
                    tracing::warn!(collection = %collection_id, "collection count timed out, skipping");
                    outcome.failed += 1;
                }
            }
        }
        outcome
    }

    /// One search per `(variant vector, collection)`, at most
    /// `max_concurrent_searches` in flight. A failed or timed-out call
    /// contributes an empty hit list.
    pub async fn search_all(&self, descriptors: &[CollectionDescriptor], query_vectors: &[Vec<f32>], k: usize) -> SearchOutcome {
        let jobs: Vec<(usize, &Vec<f32>, &CollectionDescriptor)> = query_vectors
            .iter()
            .enumerate()
            .flat_map(|(vi, v)| descriptors.iter().map(move |d| (vi, v, d)))
            .collect();
        let timeout = self.options.call_timeout();
        let limit = self.options.max_concurrent_searches.max(1);

        let calls: Vec<(usize, &str, Option<Vec<Chunk>>)> = stream::iter(jobs)
            .map(|(vi, vector, d)| {
                let store = self.store.clone();
                async move {
                    let id = d.collection_id.as_str();
                    let hits = match tokio::time::timeout(timeout, store.search(id, vector, k)).await {
                        Ok(Ok(matches)) => Some(matches.into_iter().map(|m| Chunk::from_match(id, m)).collect()),
                        Ok(Err(e)) => {
                            tracing::warn!(collection = id, variant = vi, error = %e, "collection search failed");
                            None
                        }
                        Err(_) => {
                            tracing::warn!(collection = id, variant = vi, timeout_ms = timeout.as_millis() as u64, "collection search timed out");
                            None
                        }
                    };
                    (vi, id, hits)
                }
            })
            .buffered(limit)
            .collect()
            .await;

        let mut outcome = SearchOutcome::default();
        let mut failed: BTreeSet<&str> = BTreeSet::new();
        for (_, collection_id, hits) in calls {
            match hits {
                Some(hits) => {
                    outcome.succeeded_calls += 1;
                    outcome.results.push(CollectionHits { collection_id: collection_id.to_string(), hits });
                }
                None => {
                    outcome.failed_calls += 1;
                    failed.insert(collection_id);
                    outcome.results.push(CollectionHits { collection_id: collection_id.to_string(), hits: Vec::new() });
                }
            }
        }
        outcome.failed_collections = failed.len();
        tracing::debug!(
            calls = outcome.succeeded_calls + outcome.failed_calls,
            failed = outcome.failed_calls,
            "collection search fan-out done"
        );
        outcome
    }
}
