use std::time::Duration;

use moka::sync::Cache;

use docrag_core::traits::CacheStore;
use docrag_core::types::CacheEntry;

/// Capacity-bounded in-process `CacheStore` on moka.
///
/// Per-entry expiry is checked by `ResponseCache`; the moka TTL only keeps
/// abandoned entries from living forever.
pub struct MemoryCacheStore {
    cache: Cache<String, CacheEntry>,
}

impl MemoryCacheStore {
    pub fn new(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(Duration::from_secs(86400))
            .build();
        Self { cache }
    }

    pub fn len(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, fingerprint: &str) -> anyhow::Result<Option<CacheEntry>> {
        Ok(self.cache.get(fingerprint))
    }

    fn put(&self, entry: CacheEntry) -> anyhow::Result<()> {
        self.cache.insert(entry.fingerprint.clone(), entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use docrag_core::types::ContextBundle;

    fn entry(fp: &str) -> CacheEntry {
        let now = Utc::now();
        CacheEntry { fingerprint: fp.into(), bundle: ContextBundle::default(), created_at: now, expires_at: now }
    }

    #[test]
    fn put_then_get() {
        let store = MemoryCacheStore::new(10);
        store.put(entry("abc")).unwrap();
        assert_eq!(store.get("abc").unwrap().map(|e| e.fingerprint), Some("abc".to_string()));
        assert!(store.get("missing").unwrap().is_none());
        assert_eq!(store.len(), 1);
    }
}
