//! Synonym source seam for compile-time keyword expansion.
//!
//! Expansion is bounded at two levels: [`expand`] considers at most the
//! first 3 synsets and 3 lemmas per synset of whatever the source
//! returns, and the compiler accepts at most 5 expanded forms per
//! keyword. A WordNet-style backend plugs in behind [`SynonymSource`];
//! the bundled [`StaticSynonyms`] reads a plain JSON map, which keeps the
//! engine free of any linguistic database dependency.

use std::{collections::HashMap, fs, path::Path};

use compact_str::CompactString;
use serde::Deserialize;
use tracing::warn;

use crate::error::{AppResult, file_read_error, rules_parse_error};

/// Maximum synsets consulted per keyword.
const MAX_SYNSETS: usize = 3;

/// Maximum lemmas consulted per synset.
const MAX_LEMMAS_PER_SYNSET: usize = 3;

/// Provider of synonym groups for a surface form.
pub trait SynonymSource: Send + Sync {
    /// Synsets for `word`, each a group of lemma strings. Lemmas may use
    /// `_` as a word separator, WordNet style.
    fn synsets(&self, word: &str) -> Vec<Vec<String>>;
}

/// Expand a keyword through `source` with bounded fan-out.
///
/// Lemmas are lowercased, `_` separators become spaces, and only forms
/// of at least 3 characters that differ from the original are kept.
pub fn expand(word: &str, source: &dyn SynonymSource) -> Vec<String> {
    let mut accepted = Vec::new();
    for synset in source.synsets(word).into_iter().take(MAX_SYNSETS) {
        for lemma in synset.into_iter().take(MAX_LEMMAS_PER_SYNSET) {
            let form = lemma.to_lowercase().replace('_', " ");
            if form != word && form.len() >= 3 && !accepted.contains(&form) {
                accepted.push(form);
            }
        }
    }
    accepted
}

/// In-memory synonym table backed by a JSON map of
/// `word -> [[lemma, ...], ...]`.
#[derive(Debug, Default)]
pub struct StaticSynonyms {
    map: HashMap<CompactString, Vec<Vec<String>>>
}

#[derive(Deserialize)]
struct SynonymFile(HashMap<String, Vec<Vec<String>>>);

impl StaticSynonyms {
    /// Empty table: every expansion yields nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load a synonym table from a JSON file.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).map_err(|e| file_read_error(&path.display().to_string(), e))?;
        let parsed: SynonymFile = serde_json::from_str(&content)
            .map_err(|e| rules_parse_error(&path.display().to_string(), e.to_string()))?;
        Ok(Self {
            map: parsed
                .0
                .into_iter()
                .map(|(k, v)| (CompactString::from(k.to_lowercase()), v))
                .collect()
        })
    }

    /// Load the table when a path is configured, falling back to an
    /// empty table (with a log) when loading fails.
    pub fn from_optional_file(path: Option<&Path>) -> Self {
        match path {
            None => Self::empty(),
            Some(p) => Self::from_file(p).unwrap_or_else(|e| {
                warn!(path = %p.display(), %e, "Failed to load synonym table, expansion disabled");
                Self::empty()
            })
        }
    }

    /// Insert synsets for a word. Used by tests and embedders of the
    /// library that already hold a table in memory.
    pub fn insert(&mut self, word: impl Into<CompactString>, synsets: Vec<Vec<String>>) {
        self.map.insert(word.into(), synsets);
    }
}

impl SynonymSource for StaticSynonyms {
    fn synsets(&self, word: &str) -> Vec<Vec<String>> {
        self.map.get(word).cloned().unwrap_or_default()
    }
}
