//! The request-scoped retrieval pipeline.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use docrag_cache::ResponseCache;
use docrag_core::error::{Error, Result};
use docrag_core::traits::{AcronymDictionary, Embedder, MemoryStore, SkillsResolver, VectorStore};
use docrag_core::types::{CategoryId, Chunk, ContextBundle, MemoryBlock, RetrievalSettings, SkillFragment};
use docrag_rerank::{rerank, LexicalScorer, RerankerSet};

use crate::assemble::{assemble, AssemblyStats};
use crate::collaborators::{NoMemory, NoSkills};
use crate::expand::{expand, StaticAcronymDictionary};
use crate::merge::merge;
use crate::router::{CollectionRouter, PipelineOptions};

/// Per-request caller context.
#[derive(Debug, Clone, Default)]
pub struct AuxiliaryContext {
    pub user_id: String,
    pub cancellation: CancellationToken,
}

impl AuxiliaryContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), cancellation: CancellationToken::new() }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }
}

struct Retrieval {
    ranked: Vec<Chunk>,
    stats: AssemblyStats,
    /// Nothing could be searched because every collaborator call failed.
    failed: bool,
    /// Rerank was requested but the similarity order was kept.
    rerank_fell_back: bool,
}

impl Retrieval {
    fn unavailable(collections_failed: usize) -> Self {
        Self { ranked: Vec::new(), stats: AssemblyStats { collections_failed, ..Default::default() }, failed: true, rerank_fell_back: false }
    }
}

pub struct RagPipeline {
    embedder: Arc<dyn Embedder>,
    router: CollectionRouter,
    rerankers: RerankerSet,
    skills: Arc<dyn SkillsResolver>,
    memory: Arc<dyn MemoryStore>,
    dictionary: Arc<dyn AcronymDictionary>,
    cache: Option<Arc<ResponseCache>>,
    options: PipelineOptions,
}

pub struct RagPipelineBuilder {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    rerankers: Option<RerankerSet>,
    skills: Arc<dyn SkillsResolver>,
    memory: Arc<dyn MemoryStore>,
    dictionary: Arc<dyn AcronymDictionary>,
    cache: Option<Arc<ResponseCache>>,
    options: PipelineOptions,
}

impl RagPipelineBuilder {
    pub fn rerankers(mut self, rerankers: RerankerSet) -> Self {
        self.rerankers = Some(rerankers);
        self
    }

    pub fn skills(mut self, skills: Arc<dyn SkillsResolver>) -> Self {
        self.skills = skills;
        self
    }

    pub fn memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = memory;
        self
    }

    pub fn dictionary(mut self, dictionary: Arc<dyn AcronymDictionary>) -> Self {
        self.dictionary = dictionary;
        self
    }

    pub fn cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> RagPipeline {
        RagPipeline {
            embedder: self.embedder,
            router: CollectionRouter::new(self.store, self.options.clone()),
            rerankers: self.rerankers.unwrap_or_else(|| RerankerSet::new(Arc::new(LexicalScorer::new()))),
            skills: self.skills,
            memory: self.memory,
            dictionary: self.dictionary,
            cache: self.cache,
            options: self.options,
        }
    }
}

impl RagPipeline {
    pub fn builder(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> RagPipelineBuilder {
        RagPipelineBuilder {
            embedder,
            store,
            rerankers: None,
            skills: Arc::new(NoSkills),
            memory: Arc::new(NoMemory),
            dictionary: Arc::new(StaticAcronymDictionary::new()),
            cache: None,
            options: PipelineOptions::default(),
        }
    }

    /// Build the context bundle for one user question.
    ///
    /// Collaborator failures degrade the bundle instead of failing the call.
    /// Errors are limited to an empty query, invalid settings, and
    /// cancellation through `aux.cancellation`.
    pub async fn query(
        &self,
        user_text: &str,
        permitted_category_ids: &[CategoryId],
        settings: &RetrievalSettings,
        aux: &AuxiliaryContext,
    ) -> Result<ContextBundle> {
        let query = user_text.trim();
        if query.is_empty() {
            return Err(Error::InvalidArgument("query text is empty".into()));
        }
        settings.validate()?;
        if aux.cancellation.is_cancelled() {
            return Err(Error::Cancelled);
        }
        tokio::select! {
            biased;
            _ = aux.cancellation.cancelled() => {
                tracing::info!(user = %aux.user_id, "query cancelled");
                Err(Error::Cancelled)
            }
            bundle = self.run(query, permitted_category_ids, settings, aux) => Ok(bundle),
        }
    }

    async fn run(&self, query: &str, permitted: &[CategoryId], settings: &RetrievalSettings, aux: &AuxiliaryContext) -> ContextBundle {
        let started_at = Instant::now();
        let cache = self.cache.as_ref().filter(|_| settings.cache_enabled);
        let fingerprint = cache.map(|c| c.fingerprint(query, permitted, settings, &aux.user_id));
        if let (Some(cache), Some(fp)) = (cache, fingerprint.as_deref()) {
            if let Some(bundle) = cache.get(fp) {
                return bundle;
            }
        }

        let expanded = expand(query, settings, self.dictionary.as_ref());
        let (retrieval, skills, memory) = tokio::join!(
            self.retrieve(query, &expanded, permitted, settings),
            self.resolve_skills(permitted, query),
            self.load_memory(&aux.user_id, permitted),
        );

        let bundle = assemble(retrieval.ranked, settings, skills, memory, expanded, started_at, retrieval.stats);
        tracing::info!(
            chunks = bundle.metrics.chunks_retrieved,
            candidates = bundle.metrics.candidates_considered,
            collections = bundle.metrics.collections_queried,
            failed = bundle.metrics.collections_failed,
            reranked = bundle.metrics.reranked,
            latency_ms = bundle.metrics.latency_ms,
            "query served"
        );

        if let (Some(cache), Some(fp)) = (cache, fingerprint.as_deref()) {
            // A degraded bundle would outlive the collaborator outage by the full TTL.
            let degraded = retrieval.failed || retrieval.stats.collections_failed > 0 || retrieval.rerank_fell_back;
            if degraded {
                tracing::debug!(
                    failed = retrieval.failed,
                    collections_failed = retrieval.stats.collections_failed,
                    rerank_fell_back = retrieval.rerank_fell_back,
                    "not caching degraded bundle"
                );
            } else if !aux.cancellation.is_cancelled() {
                cache.put(fp, &bundle, settings.cache_ttl_seconds);
            }
        }
        bundle
    }

    async fn embed(&self, variants: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let embedder = self.embedder.clone();
        let texts = variants.to_vec();
        let task = tokio::task::spawn_blocking(move || embedder.embed_batch(&texts));
        let vectors = tokio::time::timeout(self.options.call_timeout(), task)
            .await
            .map_err(|_| Error::Timeout("embedding".into()))?
            .map_err(|e| Error::collaborator("embedder", e))??;
        anyhow::ensure!(vectors.len() == variants.len(), "embedder returned {} vectors for {} inputs", vectors.len(), variants.len());
        Ok(vectors)
    }

    async fn retrieve(&self, query: &str, variants: &[String], permitted: &[CategoryId], settings: &RetrievalSettings) -> Retrieval {
        let (vectors, route) = tokio::join!(self.embed(variants), self.router.route(permitted));
        let vectors = match vectors {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "embedding failed, answering without retrieved context");
                return Retrieval::unavailable(route.failed);
            }
        };
        if route.descriptors.is_empty() {
            if route.failed > 0 {
                return Retrieval::unavailable(route.failed);
            }
            return Retrieval { ranked: Vec::new(), stats: AssemblyStats::default(), failed: false, rerank_fell_back: false };
        }

        let search = self.router.search_all(&route.descriptors, &vectors, settings.top_k_per_collection).await;
        let mut stats = AssemblyStats {
            collections_queried: route.descriptors.len(),
            collections_failed: route.failed + search.failed_collections,
            reranked: false,
        };
        let failed = search.succeeded_calls == 0;
        if failed {
            tracing::warn!(collections = route.descriptors.len(), "every collection search failed");
        }

        let mut ranked = merge(search.results, settings.similarity_threshold);
        tracing::debug!(candidates = ranked.len(), threshold = settings.similarity_threshold, "merged");
        let mut rerank_fell_back = false;
        if settings.rerank_enabled && !ranked.is_empty() {
            let scorer = self.rerankers.select(settings.rerank_provider);
            let outcome = rerank(query, ranked, scorer.as_ref(), self.options.call_timeout()).await;
            stats.reranked = outcome.applied;
            rerank_fell_back = !outcome.applied;
            ranked = outcome.chunks;
        }
        Retrieval { ranked, stats, failed, rerank_fell_back }
    }

    async fn resolve_skills(&self, permitted: &[CategoryId], query: &str) -> Vec<SkillFragment> {
        match tokio::time::timeout(self.options.call_timeout(), self.skills.resolve_skills(permitted, query)).await {
            Ok(Ok(skills)) => skills,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "skills resolver failed, continuing without skills");
                Vec::new()
            }
            Err(_) => {
                tracing::warn!("skills resolver timed out, continuing without skills");
                Vec::new()
            }
        }
    }

    /// Facts for the single permitted category, or global facts otherwise.
    async fn load_memory(&self, user_id: &str, permitted: &[CategoryId]) -> Option<MemoryBlock> {
        let distinct: BTreeSet<&str> = permitted.iter().map(String::as_str).collect();
        let scope = match distinct.len() {
            1 => distinct.into_iter().next(),
            _ => None,
        };
        match tokio::time::timeout(self.options.call_timeout(), self.memory.get_facts(user_id, scope)).await {
            Ok(Ok(facts)) => Some(MemoryBlock { scope: scope.map(str::to_string), facts }),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "memory store failed, continuing without memory");
                None
            }
            Err(_) => {
                tracing::warn!("memory store timed out, continuing without memory");
                None
            }
        }
    }
}
