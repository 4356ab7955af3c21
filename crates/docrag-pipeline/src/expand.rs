//! Acronym <-> phrase query variants.

use regex::{NoExpand, Regex, RegexBuilder};
use std::collections::BTreeMap;

use docrag_core::config::Config;
use docrag_core::traits::AcronymDictionary;
use docrag_core::types::{RetrievalSettings, MAX_QUERY_EXPANSIONS};

/// In-memory dictionary, loadable from the `[acronyms]` config table
/// (`PTO = "paid time off"`).
#[derive(Debug, Clone, Default)]
pub struct StaticAcronymDictionary {
    entries: BTreeMap<String, String>,
}

impl StaticAcronymDictionary {
    pub fn new() -> Self { Self::default() }

    pub fn from_pairs<I, A, P>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, P)>,
        A: Into<String>,
        P: Into<String>,
    {
        Self { entries: pairs.into_iter().map(|(a, p)| (a.into(), p.into())).collect() }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let entries: BTreeMap<String, String> = config.get_or_default("acronyms")?;
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

impl AcronymDictionary for StaticAcronymDictionary {
    fn entries(&self) -> Vec<(String, String)> {
        self.entries.iter().map(|(a, p)| (a.clone(), p.clone())).collect()
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Whole-word pattern for `term`. `\b` is only added on sides that start or
/// end with a word character, so terms like `C++` still match.
fn term_pattern(term: &str, case_insensitive: bool) -> Option<Regex> {
    let words: Vec<String> = term.split_whitespace().map(regex::escape).collect();
    if words.is_empty() {
        return None;
    }
    let mut pattern = words.join(r"\s+");
    if term.trim_start().starts_with(is_word_char) {
        pattern.insert_str(0, r"\b");
    }
    if term.trim_end().ends_with(is_word_char) {
        pattern.push_str(r"\b");
    }
    RegexBuilder::new(&pattern).case_insensitive(case_insensitive).build().ok()
}

/// Query variants for retrieval, original first, at most
/// `MAX_QUERY_EXPANSIONS` in total.
///
/// For each dictionary entry in acronym order, an acronym found in the query
/// (case-sensitive) yields a variant with the phrase substituted, and a phrase
/// found in the query (case-insensitive) yields a variant with the acronym
/// substituted.
pub fn expand(query: &str, settings: &RetrievalSettings, dictionary: &dyn AcronymDictionary) -> Vec<String> {
    let mut out = vec![query.to_string()];
    if !settings.query_expansion_enabled {
        return out;
    }
    let mut entries = dictionary.entries();
    entries.sort();

    'entries: for (acronym, phrase) in &entries {
        let candidates = [
            (term_pattern(acronym, false), phrase.trim()),
            (term_pattern(phrase, true), acronym.trim()),
        ];
        for (pattern, replacement) in candidates {
            if out.len() >= MAX_QUERY_EXPANSIONS {
                break 'entries;
            }
            let Some(re) = pattern else { continue };
            if replacement.is_empty() || !re.is_match(query) {
                continue;
            }
            let variant = re.replace_all(query, NoExpand(replacement)).into_owned();
            if !out.contains(&variant) {
                out.push(variant);
            }
        }
    }
    if out.len() > 1 {
        tracing::debug!(variants = out.len(), "query expanded");
    }
    out
}
