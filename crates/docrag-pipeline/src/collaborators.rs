//! Simple in-process skills and memory providers.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

use docrag_core::traits::{MemoryStore, SkillsResolver};
use docrag_core::types::{CategoryId, SkillFragment};

pub struct NoSkills;

#[async_trait]
impl SkillsResolver for NoSkills {
    async fn resolve_skills(&self, _category_ids: &[CategoryId], _message_text: &str) -> anyhow::Result<Vec<SkillFragment>> {
        Ok(Vec::new())
    }
}

/// A skill with its trigger. Empty `categories` matches any category;
/// empty `keywords` matches any message.
#[derive(Debug, Clone, Deserialize)]
pub struct SkillRule {
    #[serde(flatten)]
    pub fragment: SkillFragment,
    #[serde(default)]
    pub categories: Vec<CategoryId>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl SkillRule {
    fn triggers(&self, category_ids: &[CategoryId], message_lower: &str) -> bool {
        let category_ok = self.categories.is_empty() || self.categories.iter().any(|c| category_ids.contains(c));
        let keyword_ok = self.keywords.is_empty() || self.keywords.iter().any(|k| message_lower.contains(&k.to_lowercase()));
        category_ok && keyword_ok
    }
}

/// Rule list evaluated in declaration order; loadable from `[[skills]]`.
#[derive(Debug, Clone, Default)]
pub struct StaticSkills {
    rules: Vec<SkillRule>,
}

impl StaticSkills {
    pub fn new(rules: Vec<SkillRule>) -> Self { Self { rules } }

    pub fn from_config(config: &docrag_core::config::Config) -> anyhow::Result<Self> {
        Ok(Self { rules: config.get_or_default("skills")? })
    }
}

#[async_trait]
impl SkillsResolver for StaticSkills {
    async fn resolve_skills(&self, category_ids: &[CategoryId], message_text: &str) -> anyhow::Result<Vec<SkillFragment>> {
        let lower = message_text.to_lowercase();
        Ok(self.rules.iter().filter(|r| r.triggers(category_ids, &lower)).map(|r| r.fragment.clone()).collect())
    }
}

pub struct NoMemory;

#[async_trait]
impl MemoryStore for NoMemory {
    async fn get_facts(&self, _user_id: &str, _category_id: Option<&str>) -> anyhow::Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Facts keyed by `(user, scope)`; `None` scope is global.
#[derive(Debug, Clone, Default)]
pub struct StaticMemory {
    facts: HashMap<(String, Option<CategoryId>), Vec<String>>,
}

impl StaticMemory {
    pub fn new() -> Self { Self::default() }

    pub fn with_facts<I, S>(mut self, user_id: &str, category_id: Option<&str>, facts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.facts
            .entry((user_id.to_string(), category_id.map(str::to_string)))
            .or_default()
            .extend(facts.into_iter().map(Into::into));
        self
    }
}

#[async_trait]
impl MemoryStore for StaticMemory {
    async fn get_facts(&self, user_id: &str, category_id: Option<&str>) -> anyhow::Result<Vec<String>> {
        let key = (user_id.to_string(), category_id.map(str::to_string));
        Ok(self.facts.get(&key).cloned().unwrap_or_default())
    }
}
