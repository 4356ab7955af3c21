use serde::Deserialize;
use std::time::Duration;

/// The `rerank` config section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    pub base_url: Option<String>,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Local cross-encoder directory; falls back to `models/bge-reranker`.
    pub model_dir: Option<String>,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            model: "rerank-v3.5".to_string(),
            api_key: None,
            timeout_secs: 10,
            model_dir: None,
        }
    }
}

impl RerankConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}
