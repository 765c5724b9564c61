//! Rule compilation: turn a validated [`RuleSet`] into matching indices.
//!
//! Compilation is a pure function of the rule set and the oracle outputs:
//! the same inputs produce structurally identical indices, and index maps
//! iterate in rule/document order so matching stays deterministic across
//! runs. The produced [`Snapshot`] is immutable; the engine publishes it
//! with a single atomic swap.

use compact_str::CompactString;
use regex::RegexBuilder;
use tracing::{error, info};

use crate::{
    embedding::Embedder,
    error::pattern_compile_error,
    rules::{
        synonyms::{SynonymSource, expand},
        types::{Indices, Rule, RuleEmbeddings, RuleRef, RuleSet, Snapshot, StemRef}
    },
    stem::stem
};

/// Maximum accepted synonym expansions per keyword.
const MAX_SYNONYMS_PER_KEYWORD: usize = 5;

/// Build a fresh snapshot from a rule set.
///
/// Invalid patterns are skipped with a log (the loader already filters
/// them; this guards rule sets built programmatically). Embedding
/// failures skip the affected example and never fail compilation.
pub async fn compile(
    set: &RuleSet,
    synonyms: &dyn SynonymSource,
    embedder: &dyn Embedder
) -> Snapshot {
    let mut indices = Indices::default();
    let embed_enabled = embedder.available();
    if !embed_enabled
        && set
            .rules
            .iter()
            .any(|r| r.examples.as_ref().is_some_and(|e| !e.is_empty()))
    {
        info!("Embedding oracle unavailable, semantic stage will contribute nothing");
    }

    for rule in &set.rules {
        index_keywords(rule, set, synonyms, &mut indices);
        index_patterns(rule, &mut indices);
        if embed_enabled {
            index_embeddings(rule, embedder, &mut indices).await;
        }
    }

    info!(
        keywords = indices.keywords.len(),
        patterns = indices.patterns.len(),
        embeddings = indices.embeddings.len(),
        "Precomputed rule indices"
    );

    Snapshot {
        rules: set.rules.clone(),
        min_word_length_for_fuzzy: set.min_word_length_for_fuzzy,
        whitelist: set.whitelist.clone(),
        indices,
        loaded_at: set.mtime
    }
}

/// Expand and insert a rule's keywords into the keyword and stem indices.
fn index_keywords(rule: &Rule, set: &RuleSet, synonyms: &dyn SynonymSource, indices: &mut Indices) {
    let Some(keywords) = &rule.keywords else {
        return;
    };

    let mut forms: Vec<String> = Vec::new();
    for keyword in keywords {
        if keyword.len() < 2 {
            continue;
        }
        let lowered = keyword.trim().to_lowercase();
        if !forms.contains(&lowered) {
            forms.push(lowered.clone());
        }
        if rule.expand_synonyms {
            for synonym in expand(&lowered, synonyms)
                .into_iter()
                .take(MAX_SYNONYMS_PER_KEYWORD)
            {
                if !forms.contains(&synonym) {
                    forms.push(synonym);
                }
            }
        }
    }

    for form in forms {
        if form.len() < 2 || set.whitelist.contains(form.as_str()) {
            continue;
        }
        let form = CompactString::from(form);
        indices
            .keywords
            .entry(form.clone())
            .or_default()
            .push(RuleRef {
                rule_id:  rule.id.clone(),
                category: rule.category.clone()
            });

        let stemmed = stem(&form);
        if stemmed != form.as_str() && stemmed.len() >= 3 {
            indices
                .stems
                .entry(CompactString::from(stemmed))
                .or_default()
                .push(StemRef {
                    rule_id:  rule.id.clone(),
                    category: rule.category.clone(),
                    original: form
                });
        }
    }
}

/// Compile a rule's patterns case-insensitively.
fn index_patterns(rule: &Rule, indices: &mut Indices) {
    let Some(patterns) = &rule.patterns else {
        return;
    };
    let mut compiled = Vec::with_capacity(patterns.len());
    for pattern in patterns {
        match RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(regex) => compiled.push(regex),
            Err(e) => {
                let error = pattern_compile_error(&rule.id, &e);
                error!(%pattern, %error, "Skipping pattern that does not compile");
            }
        }
    }
    if !compiled.is_empty() {
        indices.patterns.insert(rule.id.clone(), compiled);
    }
}

/// Encode a rule's examples through the embedding oracle.
async fn index_embeddings(rule: &Rule, embedder: &dyn Embedder, indices: &mut Indices) {
    let Some(examples) = &rule.examples else {
        return;
    };
    let mut vectors = Vec::with_capacity(examples.len());
    let mut kept = Vec::with_capacity(examples.len());
    for example in examples {
        match embedder.encode(example).await {
            Ok(vector) => {
                vectors.push(vector);
                kept.push(example.clone());
            }
            Err(e) => {
                error!(rule_id = %rule.id, %e, "Error creating embedding for example");
            }
        }
    }
    if !vectors.is_empty() {
        indices.embeddings.insert(
            rule.id.clone(),
            RuleEmbeddings {
                vectors,
                examples: kept,
                threshold: rule.threshold
            }
        );
    }
}
