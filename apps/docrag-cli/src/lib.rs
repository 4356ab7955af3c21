//! Wiring shared by the `docrag-load` and `docrag-query` binaries.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use docrag_cache::{CacheConfig, MemoryCacheStore, ResponseCache};
use docrag_core::config::{expand_path, Config};
use docrag_core::types::RetrievalSettings;
use docrag_embed::get_default_embedder;
use docrag_pipeline::{PipelineOptions, RagPipeline, StaticAcronymDictionary, StaticSkills};
use docrag_rerank::{RerankConfig, RerankerSet};
use docrag_vector::{ChunkRecord, LanceVectorStore};
use tracing_subscriber::EnvFilter;

/// Log to stderr, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();
}

pub fn lancedb_dir(config: &Config) -> PathBuf {
    let dir: String = config.get("data.lancedb_dir").unwrap_or_else(|_| "data/lancedb".to_string());
    expand_path(dir)
}

/// `*.jsonl` files under `path` (or `path` itself), sorted. Each file holds
/// one collection; the collection id is the file stem.
pub fn collect_jsonl(path: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "jsonl"))
        .collect();
    files.sort();
    files
}

pub fn collection_id_for(file: &Path) -> Option<String> {
    file.file_stem().map(|s| s.to_string_lossy().to_string())
}

/// Parse one record per non-blank line.
pub fn read_records(file: &Path) -> Result<Vec<ChunkRecord>> {
    let text = fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| serde_json::from_str(line).with_context(|| format!("{}:{}", file.display(), i + 1)))
        .collect()
}

/// Build a pipeline from the loaded configuration. The rerank providers are
/// only loaded when `settings` enables reranking.
pub async fn build_pipeline(config: &Config, settings: &RetrievalSettings) -> Result<RagPipeline> {
    let store = LanceVectorStore::open(&lancedb_dir(config).to_string_lossy()).await?;
    let embedder = get_default_embedder()?;
    let options: PipelineOptions = config.get_or_default("pipeline")?;
    let cache_config: CacheConfig = config.get_or_default("cache")?;
    let cache = Arc::new(ResponseCache::new(Arc::new(MemoryCacheStore::new(cache_config.max_entries))));

    let mut builder = RagPipeline::builder(embedder, Arc::new(store))
        .options(options)
        .cache(cache)
        .dictionary(Arc::new(StaticAcronymDictionary::from_config(config)?))
        .skills(Arc::new(StaticSkills::from_config(config)?));
    if settings.rerank_enabled {
        let rerank_config: RerankConfig = config.get_or_default("rerank")?;
        builder = builder.rerankers(RerankerSet::from_config(&rerank_config)?);
    }
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_jsonl_records_and_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("category_hr.jsonl");
        fs::write(
            &file,
            "{\"id\":\"c1\",\"source_document_id\":\"handbook\",\"text\":\"PTO accrues monthly\",\"page_or_section\":\"p. 4\"}\n\n{\"id\":\"c2\",\"source_document_id\":\"handbook\",\"text\":\"Holidays\",\"metadata\":{\"title\":\"Handbook\"}}\n",
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let files = collect_jsonl(dir.path());
        assert_eq!(files, vec![file.clone()]);
        assert_eq!(collection_id_for(&file).as_deref(), Some("category_hr"));
        let records = read_records(&file).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].page_or_section.as_deref(), Some("p. 4"));
        assert_eq!(records[1].metadata.get("title").map(String::as_str), Some("Handbook"));
    }

    #[test]
    fn bad_line_reports_position() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("global.jsonl");
        fs::write(&file, "{\"id\":\"c1\",\"source_document_id\":\"d\",\"text\":\"t\"}\nnot json\n").unwrap();
        let err = read_records(&file).unwrap_err().to_string();
        assert!(err.ends_with("global.jsonl:2"), "{err}");
    }
}
