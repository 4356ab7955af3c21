//! Flatten per-collection hits into one deduplicated ranking.

use std::collections::HashMap;

use docrag_core::types::{Chunk, CollectionHits};

fn hits_key(group: &CollectionHits) -> impl Iterator<Item = (&str, u32)> {
    group.hits.iter().map(|c| (c.id.as_str(), c.score.to_bits()))
}

fn rank_key(score: f32) -> f32 {
    if score.is_nan() { f32::NEG_INFINITY } else { score }
}

/// Merge hit lists, keeping each chunk id once at its best score and dropping
/// anything below `threshold` (NaN scores included).
///
/// Groups are visited in collection-id order, and groups sharing an id (one
/// per query variant) are ordered by their hits, so the output does not
/// depend on the order the groups arrived in. Equal scores keep scan order.
pub fn merge(results: Vec<CollectionHits>, threshold: f32) -> Vec<Chunk> {
    let mut groups = results;
    groups.sort_by(|a, b| a.collection_id.cmp(&b.collection_id).then_with(|| hits_key(a).cmp(hits_key(b))));

    let mut kept: Vec<(usize, Chunk)> = Vec::new();
    let mut by_id: HashMap<String, usize> = HashMap::new();
    let mut pos = 0usize;
    for chunk in groups.into_iter().flat_map(|g| g.hits) {
        match by_id.get(&chunk.id) {
            Some(&slot) => {
                if rank_key(chunk.score) > rank_key(kept[slot].1.score) {
                    kept[slot] = (pos, chunk);
                }
            }
            None => {
                by_id.insert(chunk.id.clone(), kept.len());
                kept.push((pos, chunk));
            }
        }
        pos += 1;
    }

    kept.retain(|(_, c)| c.score >= threshold);
    kept.sort_by(|(pa, a), (pb, b)| b.score.total_cmp(&a.score).then(pa.cmp(pb)));
    kept.into_iter().map(|(_, c)| c).collect()
}
