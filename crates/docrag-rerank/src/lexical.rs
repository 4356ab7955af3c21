use async_trait::async_trait;
use std::collections::HashSet;

use docrag_core::traits::RelevanceScorer;

/// Fraction of distinct query terms present in the passage.
#[derive(Debug, Default, Clone)]
pub struct LexicalScorer;

impl LexicalScorer {
    pub fn new() -> Self { Self }

    fn terms(text: &str) -> HashSet<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect()
    }

    pub fn score_one(query_terms: &HashSet<String>, passage: &str) -> f32 {
        if query_terms.is_empty() {
            return 0.0;
        }
        let passage_terms = Self::terms(passage);
        let overlap = query_terms.intersection(&passage_terms).count() as f32;
        overlap / query_terms.len() as f32
    }
}

#[async_trait]
impl RelevanceScorer for LexicalScorer {
    fn name(&self) -> &str { "lexical" }

    async fn score(&self, query: &str, passages: &[String]) -> anyhow::Result<Vec<f32>> {
        let q = Self::terms(query);
        Ok(passages.iter().map(|p| Self::score_one(&q, p)).collect())
    }
}
