//! Budgeting and composition of the final bundle.

use std::collections::HashSet;
use std::time::Instant;

use docrag_core::types::{BundleMetrics, Chunk, Citation, ContextBundle, MemoryBlock, RetrievalSettings, SkillFragment};

/// Retrieval-side counters carried into the bundle metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblyStats {
    pub collections_queried: usize,
    pub collections_failed: usize,
    pub reranked: bool,
}

/// Keep at most `max_context_chunks` of `ranked`.
///
/// Chunks from documents pinned by an index skill are taken first, then the
/// best remaining chunks fill what is left. The result keeps rank order.
pub fn select_within_budget(ranked: Vec<Chunk>, max_chunks: usize, skills: &[SkillFragment]) -> Vec<Chunk> {
    if ranked.len() <= max_chunks {
        return ranked;
    }
    let pinned_docs: HashSet<&str> = skills
        .iter()
        .filter(|s| s.is_index())
        .flat_map(|s| s.pinned_document_ids.iter().map(String::as_str))
        .collect();
    let is_pinned = |c: &Chunk| pinned_docs.contains(c.source_document_id.as_str());

    let mut keep = vec![false; ranked.len()];
    let mut slots = max_chunks;
    for pass_pinned in [true, false] {
        for (i, chunk) in ranked.iter().enumerate() {
            if slots == 0 {
                break;
            }
            if !keep[i] && is_pinned(chunk) == pass_pinned {
                keep[i] = true;
                slots -= 1;
            }
        }
    }
    ranked.into_iter().zip(keep).filter_map(|(c, k)| k.then_some(c)).collect()
}

/// Compose the bundle. No retrieval happens here.
pub fn assemble(
    ranked: Vec<Chunk>,
    settings: &RetrievalSettings,
    skills: Vec<SkillFragment>,
    memory: Option<MemoryBlock>,
    expanded_queries: Vec<String>,
    started_at: Instant,
    stats: AssemblyStats,
) -> ContextBundle {
    let candidates_considered = ranked.len();
    let chunks = select_within_budget(ranked, settings.max_context_chunks, &skills);
    let citations: Vec<Citation> = chunks.iter().map(Citation::for_chunk).collect();
    let avg_similarity = if chunks.is_empty() {
        0.0
    } else {
        chunks.iter().map(|c| c.score).sum::<f32>() / chunks.len() as f32
    };
    let injected_memory = memory.filter(|m| !m.facts.is_empty());

    ContextBundle {
        metrics: BundleMetrics {
            latency_ms: u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX),
            chunks_retrieved: chunks.len(),
            candidates_considered,
            avg_similarity,
            collections_queried: stats.collections_queried,
            collections_failed: stats.collections_failed,
            reranked: stats.reranked,
        },
        chunks,
        citations,
        injected_skills: skills,
        injected_memory,
        expanded_queries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, doc: &str, score: f32) -> Chunk {
        Chunk {
            id: id.into(),
            source_document_id: doc.into(),
            collection_id: "global".into(),
            text: format!("text {id}"),
            page_or_section: None,
            score,
            metadata: Default::default(),
        }
    }

    fn index_skill(docs: &[&str]) -> SkillFragment {
        SkillFragment {
            skill_id: "s1".into(),
            name: "handbook index".into(),
            prompt: "Use the handbook.".into(),
            pinned_document_ids: docs.iter().map(|d| d.to_string()).collect(),
        }
    }

    fn ids(chunks: &[Chunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn truncation_drops_lowest_ranked() {
        let ranked = vec![chunk("a", "d1", 0.9), chunk("b", "d2", 0.8), chunk("c", "d3", 0.7)];
        assert_eq!(ids(&select_within_budget(ranked, 2, &[])), vec!["a", "b"]);
    }

    #[test]
    fn pinned_chunks_survive_the_cut_in_rank_order() {
        let ranked = vec![chunk("a", "d1", 0.9), chunk("b", "d2", 0.8), chunk("c", "d3", 0.7), chunk("d", "handbook", 0.4)];
        let kept = select_within_budget(ranked, 2, &[index_skill(&["handbook"])]);
        assert_eq!(ids(&kept), vec!["a", "d"]);
    }

    #[test]
    fn pins_are_still_bounded_by_budget() {
        let ranked = vec![chunk("a", "h", 0.9), chunk("b", "h", 0.8), chunk("c", "h", 0.7), chunk("d", "x", 0.95)];
        let kept = select_within_budget(ranked, 2, &[index_skill(&["h"])]);
        assert_eq!(ids(&kept), vec!["a", "b"]);
    }

    #[test]
    fn empty_memory_is_omitted_and_avg_is_zero() {
        let memory = Some(MemoryBlock { scope: None, facts: vec![] });
        let bundle = assemble(vec![], &RetrievalSettings::default(), vec![], memory, vec!["q".into()], Instant::now(), AssemblyStats::default());
        assert!(bundle.injected_memory.is_none());
        assert_eq!(bundle.metrics.avg_similarity, 0.0);
        assert_eq!(bundle.metrics.chunks_retrieved, 0);
    }
}
