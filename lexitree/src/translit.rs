//! Transliteration dictionaries
//!
//! A transliteration dictionary is a pure rewrite table: it owns no articles
//! and answers no lookups, it only proposes alternate writings of a query
//! (say, romanized input rewritten into another script) that the caller can
//! then look up in real dictionaries.

use std::collections::HashMap;

use anyhow::Result;
use futures::future::BoxFuture;
use futures::FutureExt;

use crate::btree::WordArticleLink;
use crate::dict::{Dictionary, WordMatch, WordSearchRequest};
use crate::folding;

/// A rewrite table for one transliteration scheme.
#[derive(Debug, Default)]
pub struct TranslitTable {
    entries: HashMap<String, String>,
    max_entry_size: usize,
}

impl TranslitTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rewrite rule.
    pub fn insert(&mut self, from: &str, to: &str) {
        let size = from.chars().count();
        if size > self.max_entry_size {
            self.max_entry_size = size;
        }
        self.entries.insert(from.to_string(), to.to_string());
    }
}

/// A dictionary kind producing alternate writings through a rewrite table.
pub struct TransliterationDictionary {
    name: String,
    table: TranslitTable,
    case_sensitive: bool,
}

impl TransliterationDictionary {
    /// Wrap a table as a dictionary.
    pub fn new(name: impl Into<String>, table: TranslitTable, case_sensitive: bool) -> Self {
        Self {
            name: name.into(),
            table,
            case_sensitive,
        }
    }

    /// Rewrite `word` through the table, preferring the longest matching
    /// entry at each position. Returns the rewriting only when it differs
    /// from the input.
    pub fn alternate_writings(&self, word: &str) -> Vec<String> {
        let target = if self.case_sensitive {
            word.to_string()
        } else {
            folding::apply_simple_case_only(word)
        };

        let chars: Vec<char> = target.chars().collect();
        let mut result = String::with_capacity(target.len());

        let mut pos = 0;
        while pos < chars.len() {
            let longest = self.table.max_entry_size.min(chars.len() - pos);
            let mut matched = false;

            for size in (1..=longest).rev() {
                let candidate: String = chars[pos..pos + size].iter().collect();
                if let Some(replacement) = self.table.entries.get(&candidate) {
                    result.push_str(replacement);
                    pos += size;
                    matched = true;
                    break;
                }
            }

            if !matched {
                // No entry covers this char, keep it as it is.
                result.push(chars[pos]);
                pos += 1;
            }
        }

        if result != target {
            vec![result]
        } else {
            Vec::new()
        }
    }

    /// Alternate writings packaged as a finished search request, for callers
    /// that treat them like any other word search.
    pub fn headwords_for_synonym(&self, word: &str) -> WordSearchRequest {
        WordSearchRequest::instant(
            self.alternate_writings(word)
                .into_iter()
                .map(|word| WordMatch { word })
                .collect(),
        )
    }
}

impl Dictionary for TransliterationDictionary {
    fn name(&self) -> &str {
        &self.name
    }

    fn find_articles<'a>(&'a self, _word: &'a str) -> BoxFuture<'a, Result<Vec<WordArticleLink>>> {
        async { Ok(Vec::new()) }.boxed()
    }

    fn prefix_match(&self, _word: &str, _max_results: usize) -> WordSearchRequest {
        WordSearchRequest::instant(Vec::new())
    }

    fn stemmed_match(
        &self,
        _word: &str,
        _min_length: usize,
        _max_suffix_variation: usize,
        _max_results: usize,
    ) -> WordSearchRequest {
        WordSearchRequest::instant(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn greek_table() -> TranslitTable {
        let mut table = TranslitTable::new();
        table.insert("th", "θ");
        table.insert("ph", "φ");
        table.insert("t", "τ");
        table.insert("p", "π");
        table.insert("a", "α");
        table.insert("o", "ο");
        table.insert("s", "σ");
        table
    }

    #[test]
    fn it_prefers_the_longest_entry() {
        let dictionary =
            TransliterationDictionary::new("greek", greek_table(), false);
        assert_eq!(dictionary.alternate_writings("pathos"), vec!["παθοσ"]);
    }

    #[test]
    fn it_keeps_unmapped_characters() {
        let dictionary =
            TransliterationDictionary::new("greek", greek_table(), false);
        assert_eq!(dictionary.alternate_writings("pax"), vec!["παx"]);
    }

    #[test]
    fn it_returns_nothing_when_unchanged() {
        let dictionary =
            TransliterationDictionary::new("greek", TranslitTable::new(), false);
        assert!(dictionary.alternate_writings("word").is_empty());
    }

    #[test]
    fn it_folds_case_when_insensitive() {
        let dictionary =
            TransliterationDictionary::new("greek", greek_table(), false);
        assert_eq!(dictionary.alternate_writings("PATHOS"), vec!["παθοσ"]);
    }

    #[tokio::test]
    async fn it_packages_synonyms_as_instant_requests() {
        let dictionary =
            TransliterationDictionary::new("greek", greek_table(), false);
        let mut request = dictionary.headwords_for_synonym("pathos");
        let matches = request.matches().await.expect("instant request finishes");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].word, "παθοσ");
    }
}
