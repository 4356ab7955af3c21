use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use docrag_core::traits::CacheStore;
use docrag_core::types::{CacheEntry, CategoryId, ContextBundle, RetrievalSettings};

const FAILURE_LOG_WINDOW: Duration = Duration::from_secs(60);

/// The `cache` config section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_entries: 10_000 }
    }
}

/// What changed upstream. Every scope bumps the same version counter; the
/// scope is only reported in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationScope {
    GlobalPrompt,
    Skills,
    Memory,
    Settings,
    Dictionary,
    All,
}

#[derive(Serialize)]
struct FingerprintInput<'a> {
    query: &'a str,
    categories: Vec<&'a str>,
    settings: &'a RetrievalSettings,
    user_id: &'a str,
    version: u64,
}

/// Bundle cache over a best-effort `CacheStore`.
///
/// Store failures never surface: `get` degrades to a miss and `put` to a
/// no-op, with at most one warning per minute.
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    version: AtomicU64,
    last_failure_log: Mutex<Option<Instant>>,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store, version: AtomicU64::new(0), last_failure_log: Mutex::new(None) }
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Hex blake3 over a canonical JSON rendering of the request. Category
    /// order and duplicates do not matter.
    pub fn fingerprint(&self, query: &str, categories: &[CategoryId], settings: &RetrievalSettings, user_id: &str) -> String {
        let mut cats: Vec<&str> = categories.iter().map(String::as_str).collect();
        cats.sort_unstable();
        cats.dedup();
        let input = FingerprintInput { query, categories: cats, settings, user_id, version: self.version() };
        // Serializing a struct of strings, ints and floats cannot fail.
        let canonical = serde_json::to_vec(&input).unwrap_or_default();
        blake3::hash(&canonical).to_hex().to_string()
    }

    pub fn get(&self, fingerprint: &str) -> Option<ContextBundle> {
        self.get_at(fingerprint, Utc::now())
    }

    pub fn get_at(&self, fingerprint: &str, now: DateTime<Utc>) -> Option<ContextBundle> {
        match self.store.get(fingerprint) {
            Ok(Some(entry)) if !entry.is_expired_at(now) => {
                tracing::debug!(fingerprint, "cache hit");
                Some(entry.bundle)
            }
            Ok(Some(_)) => {
                tracing::debug!(fingerprint, "cache entry expired");
                None
            }
            Ok(None) => None,
            Err(e) => {
                self.report_store_failure("get", &e);
                None
            }
        }
    }

    pub fn put(&self, fingerprint: &str, bundle: &ContextBundle, ttl_seconds: u64) {
        if ttl_seconds == 0 {
            return;
        }
        let created_at = Utc::now();
        let expires_at = i64::try_from(ttl_seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|ttl| created_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let entry = CacheEntry { fingerprint: fingerprint.to_string(), bundle: bundle.clone(), created_at, expires_at };
        if let Err(e) = self.store.put(entry) {
            self.report_store_failure("put", &e);
        }
    }

    /// Make every existing entry unreachable.
    pub fn invalidate(&self, scope: InvalidationScope) {
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::info!(?scope, version, "response cache invalidated");
    }

    fn report_store_failure(&self, op: &str, err: &anyhow::Error) {
        let now = Instant::now();
        let mut last = self.last_failure_log.lock().unwrap_or_else(PoisonError::into_inner);
        if last.map_or(true, |t| now.duration_since(t) >= FAILURE_LOG_WINDOW) {
            *last = Some(now);
            drop(last);
            tracing::warn!(op, error = %err, "cache store unavailable, treating as miss");
        } else {
            drop(last);
            tracing::debug!(op, error = %err, "cache store unavailable");
        }
    }
}
