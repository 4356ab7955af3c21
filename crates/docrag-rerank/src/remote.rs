use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use docrag_core::traits::RelevanceScorer;

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

/// Client for a hosted cross-encoder speaking the common
/// `POST /rerank` shape (`{results: [{index, relevance_score}]}`).
pub struct RemoteReranker {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    name: String,
}

impl RemoteReranker {
    pub fn new(base_url: &str, model: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building rerank HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/rerank", base_url.trim_end_matches('/')),
            model: model.to_string(),
            api_key: api_key.to_string(),
            name: format!("remote:{model}"),
        })
    }
}

#[async_trait]
impl RelevanceScorer for RemoteReranker {
    fn name(&self) -> &str { &self.name }

    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }
        let body = RerankRequest { model: &self.model, query, documents: passages, top_n: passages.len() };
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {}", self.endpoint))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("rerank HTTP {status}: {text}");
        }
        let parsed: RerankResponse = resp.json().await.context("decoding rerank response")?;

        let mut scores: Vec<Option<f32>> = vec![None; passages.len()];
        for r in parsed.results {
            match scores.get_mut(r.index) {
                Some(slot) => *slot = Some(r.relevance_score),
                None => bail!("rerank result index {} out of range for {} documents", r.index, passages.len()),
            }
        }
        let covered = scores.iter().filter(|s| s.is_some()).count();
        if covered != passages.len() {
            bail!("rerank response covered {covered} of {} documents", passages.len());
        }
        Ok(scores.into_iter().flatten().collect())
    }
}
