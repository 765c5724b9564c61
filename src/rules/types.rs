//! Type definitions for the guardrail rule system.
//!
//! This module defines the core types used throughout the engine:
//! - [`Rule`] and [`RuleDocument`] - the declarative rule document model
//! - [`RuleSet`] - validated rules plus matching configuration
//! - [`Indices`] and [`Snapshot`] - compiled, immutable matching state
//! - [`Violation`] and [`CheckResult`] - matcher output

use std::{collections::HashSet, time::SystemTime};

use compact_str::CompactString;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::text::COMMON_WORD_WHITELIST;

/// Default semantic similarity threshold for rules that do not set one.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.75;

/// Default minimum token length considered by the fuzzy stage.
pub const DEFAULT_MIN_WORD_LENGTH_FOR_FUZZY: usize = 4;

/// Maximum number of violations returned from a single check.
pub const MAX_VIOLATIONS: usize = 10;

fn default_category() -> CompactString {
    CompactString::const_new("general")
}

fn default_threshold() -> f32 {
    DEFAULT_SIMILARITY_THRESHOLD
}

/// A single declarative guardrail rule.
///
/// Invariants enforced by the loader: non-empty unique `id`, compiling
/// `patterns`, non-empty `examples` when present, `threshold` in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Stable rule identifier. Empty means missing; the loader skips it.
    #[serde(default)]
    pub id:              CompactString,
    /// Category for grouping violations.
    #[serde(default = "default_category")]
    pub category:        CompactString,
    /// Human-readable description of what the rule catches.
    #[serde(default)]
    pub description:     Option<String>,
    /// User-facing response returned when the rule fires.
    #[serde(default)]
    pub response:        Option<String>,
    /// Surface forms matched by the keyword, lemma, stem and fuzzy stages.
    #[serde(default)]
    pub keywords:        Option<Vec<String>>,
    /// Regular expression sources, compiled case-insensitively.
    #[serde(default)]
    pub patterns:        Option<Vec<String>>,
    /// Example sentences matched by the semantic stage.
    #[serde(default)]
    pub examples:        Option<Vec<String>>,
    /// Semantic similarity threshold in [0, 1].
    #[serde(default = "default_threshold")]
    pub threshold:       f32,
    /// Expand keywords through the synonym source at compile time.
    #[serde(default)]
    pub expand_synonyms: bool
}

/// Optional configuration block of a rule document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentConfig {
    /// Override for the fuzzy stage's minimum token length.
    #[serde(default)]
    pub min_word_length_for_fuzzy: Option<usize>,
    /// Additional whitelisted words, unioned with the built-in list.
    #[serde(default)]
    pub whitelist:                 Vec<String>
}

/// Top-level shape of a rule document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleDocument {
    #[serde(default)]
    pub rules:  Vec<Rule>,
    #[serde(default)]
    pub config: DocumentConfig
}

/// Validated rules plus the matching configuration derived from the
/// document. An empty set is a legal operating state.
#[derive(Debug, Clone)]
pub struct RuleSet {
    /// Rules in document order.
    pub rules: Vec<Rule>,
    /// Minimum token length considered by the fuzzy stage.
    pub min_word_length_for_fuzzy: usize,
    /// Built-in common words unioned with document additions.
    pub whitelist: HashSet<CompactString>,
    /// Modification time of the source document.
    pub mtime: Option<SystemTime>
}

impl RuleSet {
    /// Empty rule set with built-in defaults. Every text yields no
    /// violations from the matcher.
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            min_word_length_for_fuzzy: DEFAULT_MIN_WORD_LENGTH_FOR_FUZZY,
            whitelist: builtin_whitelist(),
            mtime: None
        }
    }
}

/// Built-in whitelist as a lookup set.
pub fn builtin_whitelist() -> HashSet<CompactString> {
    COMMON_WORD_WHITELIST
        .iter()
        .map(|w| CompactString::from(*w))
        .collect()
}

/// Reference from an indexed surface form back to its rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleRef {
    pub rule_id:  CompactString,
    pub category: CompactString
}

/// Reference from an indexed stem back to its rule and the original form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StemRef {
    pub rule_id:  CompactString,
    pub category: CompactString,
    /// Surface form the stem was derived from.
    pub original: CompactString
}

/// Per-rule embedding group for the semantic stage.
#[derive(Debug, Clone)]
pub struct RuleEmbeddings {
    /// One vector per example, all of the same dimension.
    pub vectors:   Vec<Vec<f32>>,
    /// Example sentences aligned with `vectors`.
    pub examples:  Vec<String>,
    /// Similarity threshold the best match must exceed.
    pub threshold: f32
}

/// Compiled matching indices. Immutable once published.
///
/// [`IndexMap`] keeps iteration in rule/insertion order so matcher output
/// is deterministic across runs for the same document.
#[derive(Debug, Default)]
pub struct Indices {
    /// Lowercase surface form to declaring rules.
    pub keywords:   IndexMap<CompactString, SmallVec<[RuleRef; 2]>>,
    /// Porter stem to declaring rules, only where stem differs from form.
    pub stems:      IndexMap<CompactString, SmallVec<[StemRef; 2]>>,
    /// Rule id to compiled case-insensitive patterns.
    pub patterns:   IndexMap<CompactString, Vec<Regex>>,
    /// Rule id to example embeddings.
    pub embeddings: IndexMap<CompactString, RuleEmbeddings>
}

/// Immutable snapshot of the loaded rules and their compiled indices,
/// published atomically by the engine. Readers hold one snapshot for the
/// duration of a check.
#[derive(Debug)]
pub struct Snapshot {
    /// Rules in document order.
    pub rules: Vec<Rule>,
    /// Minimum token length considered by the fuzzy stage.
    pub min_word_length_for_fuzzy: usize,
    /// Built-in common words unioned with document additions.
    pub whitelist: HashSet<CompactString>,
    /// Compiled matching indices.
    pub indices: Indices,
    /// Modification time of the source document at compile time.
    pub loaded_at: Option<SystemTime>
}

impl Snapshot {
    /// Snapshot with no rules. Used at startup before the first load and
    /// when the rules file is missing.
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            min_word_length_for_fuzzy: DEFAULT_MIN_WORD_LENGTH_FOR_FUZZY,
            whitelist: builtin_whitelist(),
            indices: Indices::default(),
            loaded_at: None
        }
    }

    /// Look up a loaded rule by id.
    pub fn rule(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }
}

/// How a violation was matched, in pipeline stage terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Keyword,
    LemmaKeyword,
    StemmedKeyword,
    FuzzyKeyword,
    Pattern,
    Semantic
}

impl std::fmt::Display for MatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Keyword => write!(f, "keyword"),
            Self::LemmaKeyword => write!(f, "lemma_keyword"),
            Self::StemmedKeyword => write!(f, "stemmed_keyword"),
            Self::FuzzyKeyword => write!(f, "fuzzy_keyword"),
            Self::Pattern => write!(f, "pattern"),
            Self::Semantic => write!(f, "semantic")
        }
    }
}

/// Stage-specific evidence attached to a violation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViolationDetails {
    /// Input token that fuzzy-matched a keyword.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original:         Option<String>,
    /// Declared keyword a stem hit was derived from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_keyword: Option<String>,
    /// Cosine similarity of the best semantic match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity:       Option<f32>,
    /// Example sentence that produced the best semantic match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_example:  Option<String>
}

/// A single rule violation found in a text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Identifier of the violated rule.
    pub rule_id:    CompactString,
    /// Matching stage that produced this violation.
    #[serde(rename = "type")]
    pub kind:       MatchKind,
    /// Matched evidence string.
    pub matched:    String,
    /// Match confidence in [0, 1].
    pub confidence: f32,
    /// Stage-specific evidence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details:    Option<ViolationDetails>,
    /// Category of the violated rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category:   Option<CompactString>
}

/// Matcher output for one text. Serializable for the result cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Violations ordered by confidence, highest first.
    pub violations: Vec<Violation>
}

impl CheckResult {
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }
}
