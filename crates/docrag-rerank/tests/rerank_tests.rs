use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docrag_core::traits::RelevanceScorer;
use docrag_core::types::{Chunk, RerankProvider};
use docrag_rerank::{rerank, LexicalScorer, RemoteReranker, RerankerSet};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn chunk(id: &str, text: &str, score: f32) -> Chunk {
    Chunk {
        id: id.into(),
        source_document_id: format!("doc-{id}"),
        collection_id: "global".into(),
        text: text.into(),
        page_or_section: None,
        score,
        metadata: Default::default(),
    }
}

fn ranked() -> Vec<Chunk> {
    vec![
        chunk("a", "office hours and parking", 0.9),
        chunk("b", "paid time off accrual policy", 0.75),
        chunk("c", "expense reports", 0.6),
    ]
}

fn ids(chunks: &[Chunk]) -> Vec<&str> {
    chunks.iter().map(|c| c.id.as_str()).collect()
}

struct FailingScorer;

#[async_trait]
impl RelevanceScorer for FailingScorer {
    fn name(&self) -> &str { "failing" }
    async fn score(&self, _query: &str, _passages: &[String]) -> anyhow::Result<Vec<f32>> {
        anyhow::bail!("provider down")
    }
}

struct SlowScorer;

#[async_trait]
impl RelevanceScorer for SlowScorer {
    fn name(&self) -> &str { "slow" }
    async fn score(&self, _query: &str, passages: &[String]) -> anyhow::Result<Vec<f32>> {
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok(vec![1.0; passages.len()])
    }
}

struct ShortScorer;

#[async_trait]
impl RelevanceScorer for ShortScorer {
    fn name(&self) -> &str { "short" }
    async fn score(&self, _query: &str, _passages: &[String]) -> anyhow::Result<Vec<f32>> {
        Ok(vec![0.5])
    }
}

#[tokio::test]
async fn lexical_rerank_reorders_without_changing_ids() {
    let out = rerank("paid time off", ranked(), &LexicalScorer::new(), Duration::from_secs(1)).await;
    assert!(out.applied);
    assert_eq!(ids(&out.chunks)[0], "b");
    let mut got = ids(&out.chunks);
    got.sort();
    assert_eq!(got, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn provider_error_keeps_input() {
    let input = ranked();
    let out = rerank("pto", input.clone(), &FailingScorer, Duration::from_secs(1)).await;
    assert!(!out.applied);
    assert_eq!(out.chunks, input);
}

#[tokio::test]
async fn timeout_keeps_input() {
    let input = ranked();
    let out = rerank("pto", input.clone(), &SlowScorer, Duration::from_millis(20)).await;
    assert!(!out.applied);
    assert_eq!(out.chunks, input);
}

#[tokio::test]
async fn score_count_mismatch_keeps_input() {
    let input = ranked();
    let out = rerank("pto", input.clone(), &ShortScorer, Duration::from_secs(1)).await;
    assert!(!out.applied);
    assert_eq!(out.chunks, input);
}

#[tokio::test]
async fn empty_input_is_not_sent() {
    let out = rerank("pto", Vec::new(), &FailingScorer, Duration::from_secs(1)).await;
    assert!(!out.applied);
    assert!(out.chunks.is_empty());
}

#[tokio::test]
async fn remote_scores_map_back_by_index() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/rerank"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {"index": 2, "relevance_score": 0.97},
                {"index": 0, "relevance_score": 0.10},
                {"index": 1, "relevance_score": 0.55}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let remote = RemoteReranker::new(&format!("{}/v1/", server.uri()), "rerank-test", "secret", Duration::from_secs(5)).unwrap();
    let out = rerank("expenses", ranked(), &remote, Duration::from_secs(5)).await;
    assert!(out.applied);
    assert_eq!(ids(&out.chunks), vec!["c", "b", "a"]);
    assert!((out.chunks[0].score - 0.97).abs() < 1e-6);
}

#[tokio::test]
async fn remote_http_error_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rerank"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let remote = RemoteReranker::new(&server.uri(), "rerank-test", "secret", Duration::from_secs(5)).unwrap();
    let input = ranked();
    let out = rerank("pto", input.clone(), &remote, Duration::from_secs(5)).await;
    assert!(!out.applied);
    assert_eq!(out.chunks, input);
}

#[tokio::test]
async fn remote_partial_results_fall_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rerank"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"index": 0, "relevance_score": 0.9}]
        })))
        .mount(&server)
        .await;

    let remote = RemoteReranker::new(&server.uri(), "rerank-test", "secret", Duration::from_secs(5)).unwrap();
    let passages = vec!["a".to_string(), "b".to_string()];
    assert!(remote.score("q", &passages).await.is_err());
}

#[test]
fn select_falls_back_to_local_without_remote() {
    let set = RerankerSet::new(Arc::new(LexicalScorer::new()));
    assert_eq!(set.select(RerankProvider::Remote).name(), "lexical");
    assert_eq!(set.select(RerankProvider::Local).name(), "lexical");
}

#[test]
fn select_prefers_configured_remote() {
    let remote = RemoteReranker::new("http://127.0.0.1:9", "m", "k", Duration::from_secs(1)).unwrap();
    let set = RerankerSet::new(Arc::new(LexicalScorer::new())).with_remote(Arc::new(remote));
    assert_eq!(set.select(RerankProvider::Remote).name(), "remote:m");
    assert_eq!(set.select(RerankProvider::Local).name(), "lexical");
}
