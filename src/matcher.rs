//! Six-stage matching pipeline over a published rule snapshot.
//!
//! Stages run in a fixed order with short-circuit gating:
//!
//! 1. **Pattern** - compiled regexes against the lowercased input
//! 2. **Keyword** - exact token lookups in the keyword index
//! 3. **Lemma** - lemma lookups in the keyword index
//! 4. **Stem** - Porter-stem lookups in the stem index
//! 5. **Fuzzy** - Levenshtein comparison, only when stages 1-4 found
//!    nothing and the cleaned input is at least 4 characters
//! 6. **Semantic** - cosine similarity against rule examples, only when
//!    all prior stages found nothing and the input has at least 3 words
//!
//! Stages 1-5 are pure CPU and run on a bounded worker pool; stage 6
//! suspends once to encode the input. Violations are deduplicated on
//! `(rule_id, kind, matched)`, sorted by confidence descending (stable
//! with respect to stage order) and truncated to the top 10. For a given
//! `(text, snapshot)` pair the result is deterministic.
//!
//! Failures degrade: an embedding error is logged and the semantic stage
//! contributes nothing.

use std::{collections::HashSet, sync::Arc};

use compact_str::CompactString;
use rayon::{ThreadPool, ThreadPoolBuilder, prelude::*};
use strsim::levenshtein;
use tracing::warn;

use crate::{
    embedding::{Embedder, cosine_similarity},
    error::{AppError, AppResult},
    rules::types::{
        CheckResult, MAX_VIOLATIONS, MatchKind, Snapshot, Violation, ViolationDetails
    },
    stem::stem,
    text::{Analyzer, Token, clean_text}
};

/// Confidence assigned to lemma-stage hits.
const LEMMA_CONFIDENCE: f32 = 0.95;

/// Confidence assigned to stem-stage hits.
const STEM_CONFIDENCE: f32 = 0.90;

/// Maximum Levenshtein distance accepted by the fuzzy stage.
const MAX_EDIT_DISTANCE: usize = 2;

/// Maximum edit distance as a fraction of the token length.
const MAX_EDIT_DISTANCE_RATIO: f32 = 0.3;

/// Runs the cascade for one input text against one snapshot.
pub struct Matcher {
    analyzer: Arc<dyn Analyzer>,
    embedder: Arc<dyn Embedder>,
    pool:     ThreadPool
}

impl Matcher {
    /// Create a matcher with a worker pool of `max_workers` threads.
    ///
    /// # Errors
    ///
    /// Fails when the worker pool cannot be created.
    pub fn new(
        analyzer: Arc<dyn Analyzer>,
        embedder: Arc<dyn Embedder>,
        max_workers: usize
    ) -> AppResult<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(max_workers.max(1))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build worker pool: {}", e)))?;
        Ok(Self {
            analyzer,
            embedder,
            pool
        })
    }

    /// Evaluate `text` against `snapshot`.
    pub async fn check(&self, snapshot: &Snapshot, text: &str) -> CheckResult {
        let lowered = text.to_lowercase();
        let cleaned = clean_text(&lowered);
        let tokens = self.analyzer.analyze(text);
        let content: Vec<&Token> = tokens
            .iter()
            .filter(|t| !t.stop && !t.text.is_empty())
            .collect();

        let mut state = self.pool.install(|| {
            let mut state = StageState::default();
            pattern_stage(snapshot, &lowered, &mut state);
            keyword_stage(snapshot, &content, &mut state);
            lemma_stage(snapshot, &content, &mut state);
            stem_stage(snapshot, &content, &mut state);
            if state.violations.is_empty() && cleaned.chars().count() >= 4 {
                fuzzy_stage(snapshot, &content, &mut state);
            }
            state
        });

        if state.violations.is_empty() && cleaned.split_whitespace().count() >= 3 {
            self.semantic_stage(snapshot, &lowered, &mut state).await;
        }

        state.finish()
    }

    /// Stage 6: encode the input once and compare against every rule's
    /// example vectors, emitting at most one violation per rule.
    async fn semantic_stage(&self, snapshot: &Snapshot, lowered: &str, state: &mut StageState) {
        if snapshot.indices.embeddings.is_empty() {
            return;
        }
        let input = match self.embedder.encode(lowered).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!(%e, "Semantic matching error");
                return;
            }
        };
        for (rule_id, group) in &snapshot.indices.embeddings {
            let mut best = 0.0f32;
            let mut best_idx = None;
            for (idx, vector) in group.vectors.iter().enumerate() {
                let similarity = cosine_similarity(&input, vector);
                if best_idx.is_none() || similarity > best {
                    best = similarity;
                    best_idx = Some(idx);
                }
            }
            let Some(best_idx) = best_idx else {
                continue;
            };
            if best > group.threshold {
                state.push(Violation {
                    rule_id:    rule_id.clone(),
                    kind:       MatchKind::Semantic,
                    matched:    "semantic similarity".to_string(),
                    confidence: best.clamp(0.0, 1.0),
                    details:    Some(ViolationDetails {
                        similarity: Some(best),
                        matched_example: group.examples.get(best_idx).cloned(),
                        ..ViolationDetails::default()
                    }),
                    category:   None
                });
            }
        }
    }
}

/// Accumulates violations with `(rule_id, kind, matched)` deduplication.
#[derive(Default)]
struct StageState {
    violations: Vec<Violation>,
    seen:       HashSet<(CompactString, MatchKind, String)>
}

impl StageState {
    fn push(&mut self, violation: Violation) {
        let key = (
            violation.rule_id.clone(),
            violation.kind,
            violation.matched.clone()
        );
        if self.seen.insert(key) {
            self.violations.push(violation);
        }
    }

    /// Sort by confidence descending (stable, so stage order breaks
    /// ties) and truncate to the output cap.
    fn finish(mut self) -> CheckResult {
        self.violations.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        self.violations.truncate(MAX_VIOLATIONS);
        CheckResult {
            violations: self.violations
        }
    }
}

/// Stage 1: every compiled pattern against the lowercased input.
fn pattern_stage(snapshot: &Snapshot, lowered: &str, state: &mut StageState) {
    let entries: Vec<_> = snapshot.indices.patterns.iter().collect();
    let hits: Vec<(CompactString, String)> = entries
        .par_iter()
        .flat_map(|(rule_id, regexes)| {
            let mut found = Vec::new();
            for regex in regexes.iter() {
                for m in regex.find_iter(lowered) {
                    if !m.as_str().is_empty() {
                        found.push(((*rule_id).clone(), m.as_str().to_string()));
                    }
                }
            }
            found
        })
        .collect();
    for (rule_id, matched) in hits {
        state.push(Violation {
            rule_id,
            kind: MatchKind::Pattern,
            matched,
            confidence: 1.0,
            details: None,
            category: None
        });
    }
}

/// Stage 2: exact surface-form lookups.
fn keyword_stage(snapshot: &Snapshot, tokens: &[&Token], state: &mut StageState) {
    for token in tokens {
        let Some(refs) = snapshot.indices.keywords.get(token.text.as_str()) else {
            continue;
        };
        for rule_ref in refs {
            state.push(Violation {
                rule_id:    rule_ref.rule_id.clone(),
                kind:       MatchKind::Keyword,
                matched:    token.text.to_string(),
                confidence: 1.0,
                details:    None,
                category:   Some(rule_ref.category.clone())
            });
        }
    }
}

/// Stage 3: lemma lookups in the keyword index.
///
/// A lemma identical to its surface form would repeat the exact stage's
/// lookup, so only changed lemmas are consulted.
fn lemma_stage(snapshot: &Snapshot, tokens: &[&Token], state: &mut StageState) {
    for token in tokens {
        if token.lemma == token.text || token.lemma.is_empty() {
            continue;
        }
        let Some(refs) = snapshot.indices.keywords.get(token.lemma.as_str()) else {
            continue;
        };
        for rule_ref in refs {
            state.push(Violation {
                rule_id:    rule_ref.rule_id.clone(),
                kind:       MatchKind::LemmaKeyword,
                matched:    token.lemma.to_string(),
                confidence: LEMMA_CONFIDENCE,
                details:    None,
                category:   Some(rule_ref.category.clone())
            });
        }
    }
}

/// Stage 4: Porter-stem lookups in the stem index, recording the
/// original expanded keyword as evidence.
fn stem_stage(snapshot: &Snapshot, tokens: &[&Token], state: &mut StageState) {
    for token in tokens {
        let stemmed = stem(&token.text);
        let Some(refs) = snapshot.indices.stems.get(stemmed.as_str()) else {
            continue;
        };
        for stem_ref in refs {
            state.push(Violation {
                rule_id:    stem_ref.rule_id.clone(),
                kind:       MatchKind::StemmedKeyword,
                matched:    stemmed.clone(),
                confidence: STEM_CONFIDENCE,
                details:    Some(ViolationDetails {
                    original_keyword: Some(stem_ref.original.to_string()),
                    ..ViolationDetails::default()
                }),
                category:   Some(stem_ref.category.clone())
            });
        }
    }
}

/// Stage 5: Levenshtein comparison of each eligible token against every
/// indexed keyword.
fn fuzzy_stage(snapshot: &Snapshot, tokens: &[&Token], state: &mut StageState) {
    let hits: Vec<Violation> = tokens
        .par_iter()
        .flat_map(|token| fuzzy_matches(snapshot, &token.text))
        .collect();
    for violation in hits {
        state.push(violation);
    }
}

/// Fuzzy candidates for one token with length-dependent thresholds.
fn fuzzy_matches(snapshot: &Snapshot, word: &str) -> Vec<Violation> {
    let word_len = word.chars().count();
    if word_len < snapshot.min_word_length_for_fuzzy || snapshot.whitelist.contains(word) {
        return Vec::new();
    }

    // Very short tokens require an exact match.
    let max_distance = if word_len < 4 {
        0
    } else {
        MAX_EDIT_DISTANCE.min((word_len as f32 * MAX_EDIT_DISTANCE_RATIO) as usize)
    };

    let mut matches = Vec::new();
    for (keyword, refs) in &snapshot.indices.keywords {
        let keyword_len = keyword.chars().count();
        if keyword_len.abs_diff(word_len) > max_distance {
            continue;
        }
        let distance = levenshtein(word, keyword);
        if distance > max_distance {
            continue;
        }
        let confidence = 1.0 - (distance as f32 / keyword_len.max(1) as f32);
        let min_confidence = if word_len < 5 { 0.7 } else { 0.6 };
        if confidence < min_confidence {
            continue;
        }
        let rounded = (confidence * 100.0).round() / 100.0;
        for rule_ref in refs {
            matches.push(Violation {
                rule_id:    rule_ref.rule_id.clone(),
                kind:       MatchKind::FuzzyKeyword,
                matched:    keyword.to_string(),
                confidence: rounded,
                details:    Some(ViolationDetails {
                    original: Some(word.to_string()),
                    ..ViolationDetails::default()
                }),
                category:   Some(rule_ref.category.clone())
            });
        }
    }
    matches
}
