mod common;

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use common::{chunk, group, ids};
use docrag_core::types::{Chunk, CollectionHits, RetrievalSettings, SkillFragment};
use docrag_pipeline::{assemble, merge, AssemblyStats};
use proptest::prelude::*;

/// Collection ids repeat across groups, as they do when each query variant
/// searches the same collections.
fn arb_groups() -> impl Strategy<Value = Vec<CollectionHits>> {
    prop::collection::vec((0u8..3, prop::collection::vec((0u8..12, -1.0f32..1.0), 0..8)), 1..6).prop_map(|lists| {
        lists
            .into_iter()
            .map(|(c, hits)| {
                let collection = format!("c{c}");
                CollectionHits {
                    hits: hits.into_iter().map(|(id, s)| chunk(&format!("k{id}"), &collection, s)).collect(),
                    collection_id: collection,
                }
            })
            .collect()
    })
}

fn best_scores(groups: &[CollectionHits]) -> HashMap<String, f32> {
    let mut best: HashMap<String, f32> = HashMap::new();
    for c in groups.iter().flat_map(|g| &g.hits) {
        let e = best.entry(c.id.clone()).or_insert(f32::NEG_INFINITY);
        *e = e.max(c.score);
    }
    best
}

#[test]
fn repeated_collection_groups_merge_the_same_in_any_order() {
    let first = group("category_hr", &[("x", 0.5), ("y", 0.4)]);
    let second = group("category_hr", &[("y", 0.5), ("x", 0.4)]);
    let a = merge(vec![first.clone(), second.clone()], 0.0);
    let b = merge(vec![second, first], 0.0);
    assert_eq!(ids(&a), ids(&b));
    assert_eq!(serde_json::to_vec(&a).unwrap(), serde_json::to_vec(&b).unwrap());
}

proptest! {
    #[test]
    fn each_id_once_at_its_best_score(groups in arb_groups(), threshold in -1.0f32..1.0) {
        let best = best_scores(&groups);
        let merged = merge(groups, threshold);
        let unique: HashSet<&str> = ids(&merged).into_iter().collect();
        prop_assert_eq!(unique.len(), merged.len());
        for c in &merged {
            prop_assert_eq!(c.score, best[&c.id]);
            prop_assert!(c.score >= threshold);
        }
        let expected = best.values().filter(|s| **s >= threshold).count();
        prop_assert_eq!(merged.len(), expected);
        prop_assert!(merged.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn raising_threshold_never_grows_output(groups in arb_groups(), a in -1.0f32..1.0, b in -1.0f32..1.0) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let loose = merge(groups.clone(), lo);
        let strict = merge(groups, hi);
        prop_assert!(strict.len() <= loose.len());
    }

    #[test]
    fn group_order_does_not_change_output(
        (groups, shuffled) in arb_groups().prop_flat_map(|g| (Just(g.clone()), Just(g).prop_shuffle())),
        threshold in -1.0f32..1.0,
    ) {
        let a = serde_json::to_vec(&merge(groups, threshold)).unwrap();
        let b = serde_json::to_vec(&merge(shuffled, threshold)).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn assembled_bundle_respects_budget(
        groups in arb_groups(),
        max_chunks in 1usize..6,
        pinned in prop::collection::vec(0u8..12, 0..4),
    ) {
        let ranked: Vec<Chunk> = merge(groups, -1.0);
        let skill = SkillFragment {
            skill_id: "idx".into(),
            name: "index".into(),
            prompt: "p".into(),
            pinned_document_ids: pinned.iter().map(|k| format!("doc-k{k}")).collect(),
        };
        let settings = RetrievalSettings { max_context_chunks: max_chunks, ..Default::default() };
        let candidates = ranked.len();
        let bundle = assemble(ranked, &settings, vec![skill], None, vec!["q".into()], Instant::now(), AssemblyStats::default());
        prop_assert!(bundle.chunks.len() <= max_chunks);
        prop_assert_eq!(bundle.chunks.len(), candidates.min(max_chunks));
        prop_assert_eq!(bundle.citations.len(), bundle.chunks.len());
    }
}
