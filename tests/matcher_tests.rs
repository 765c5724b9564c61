// SPDX-FileCopyrightText: 2025 RAprogramm
// SPDX-License-Identifier: MIT

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use compact_str::CompactString;
use content_guard::{
    embedding::{DisabledEmbedder, Embedder},
    error::{AppResult, embedding_error},
    matcher::Matcher,
    rules::{
        MatchKind, Rule, Snapshot,
        compile::compile,
        synonyms::StaticSynonyms,
        types::RuleSet
    },
    text::SimpleAnalyzer
};

/// Embedder returning canned vectors per exact input text.
struct StubEmbedder {
    vectors: HashMap<String, Vec<f32>>
}

impl StubEmbedder {
    fn new(entries: &[(&str, Vec<f32>)]) -> Self {
        Self {
            vectors: entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect()
        }
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn encode(&self, text: &str) -> AppResult<Vec<f32>> {
        self.vectors
            .get(text)
            .cloned()
            .ok_or_else(|| embedding_error(format!("no stub vector for '{}'", text)))
    }
}

fn finance_rule() -> Rule {
    Rule {
        id:              CompactString::from("finance"),
        category:        CompactString::from("financial_advice"),
        description:     Some("Financial advice requests".to_string()),
        response:        None,
        keywords:        Some(vec!["invest".to_string(), "stock".to_string()]),
        patterns:        None,
        examples:        Some(vec!["Should I buy Tesla stock?".to_string()]),
        threshold:       0.75,
        expand_synonyms: false
    }
}

fn selfharm_rule() -> Rule {
    Rule {
        id:              CompactString::from("selfharm"),
        category:        CompactString::from("safety"),
        description:     Some("Self-harm statements".to_string()),
        response:        Some("Please reach out for help.".to_string()),
        keywords:        None,
        patterns:        Some(vec![r"\bkill myself\b".to_string()]),
        examples:        None,
        threshold:       0.75,
        expand_synonyms: false
    }
}

fn rule_set(rules: Vec<Rule>) -> RuleSet {
    RuleSet {
        rules,
        ..RuleSet::empty()
    }
}

async fn snapshot(rules: Vec<Rule>) -> Snapshot {
    compile(&rule_set(rules), &StaticSynonyms::empty(), &DisabledEmbedder).await
}

async fn snapshot_with_embedder(rules: Vec<Rule>, embedder: &dyn Embedder) -> Snapshot {
    compile(&rule_set(rules), &StaticSynonyms::empty(), embedder).await
}

fn matcher() -> Matcher {
    Matcher::new(Arc::new(SimpleAnalyzer::new()), Arc::new(DisabledEmbedder), 2)
        .unwrap_or_else(|e| panic!("failed to build matcher: {}", e))
}

fn matcher_with_embedder(embedder: Arc<dyn Embedder>) -> Matcher {
    Matcher::new(Arc::new(SimpleAnalyzer::new()), embedder, 2)
        .unwrap_or_else(|e| panic!("failed to build matcher: {}", e))
}

#[tokio::test]
async fn test_exact_keyword_match() {
    let snap = snapshot(vec![finance_rule(), selfharm_rule()]).await;
    let result = matcher()
        .check(&snap, "Is it good to buy Tesla stock?")
        .await;

    assert_eq!(result.violations.len(), 1);
    let violation = &result.violations[0];
    assert_eq!(violation.rule_id, "finance");
    assert_eq!(violation.kind, MatchKind::Keyword);
    assert_eq!(violation.matched, "stock");
    assert_eq!(violation.confidence, 1.0);
    assert_eq!(violation.category.as_deref(), Some("financial_advice"));
}

#[tokio::test]
async fn test_lemma_match_on_inflected_token() {
    let snap = snapshot(vec![finance_rule(), selfharm_rule()]).await;
    let result = matcher()
        .check(&snap, "Is it good to invests in Tesla stocks?")
        .await;

    assert!(!result.violations.is_empty());
    assert!(result.violations.iter().all(|v| v.kind == MatchKind::LemmaKeyword));
    let invest = result
        .violations
        .iter()
        .find(|v| v.matched == "invest")
        .unwrap_or_else(|| panic!("no lemma violation for 'invest'"));
    assert_eq!(invest.rule_id, "finance");
    assert_eq!(invest.confidence, 0.95);
    assert!(
        !result
            .violations
            .iter()
            .any(|v| v.kind == MatchKind::FuzzyKeyword)
    );
}

#[tokio::test]
async fn test_stem_match_records_original_keyword() {
    let mut rule = finance_rule();
    rule.keywords = Some(vec!["investing".to_string()]);
    rule.examples = None;
    let snap = snapshot(vec![rule]).await;
    let result = matcher().check(&snap, "he invested everything").await;

    assert_eq!(result.violations.len(), 1);
    let violation = &result.violations[0];
    assert_eq!(violation.kind, MatchKind::StemmedKeyword);
    assert_eq!(violation.matched, "invest");
    assert_eq!(violation.confidence, 0.90);
    let details = violation
        .details
        .as_ref()
        .unwrap_or_else(|| panic!("stem violation without details"));
    assert_eq!(details.original_keyword.as_deref(), Some("investing"));
}

#[tokio::test]
async fn test_fuzzy_match_on_typo() {
    let snap = snapshot(vec![finance_rule(), selfharm_rule()]).await;
    let result = matcher()
        .check(&snap, "Is it good to stok some money?")
        .await;

    assert_eq!(result.violations.len(), 1);
    let violation = &result.violations[0];
    assert_eq!(violation.kind, MatchKind::FuzzyKeyword);
    assert_eq!(violation.matched, "stock");
    assert!((violation.confidence - 0.8).abs() < 1e-6);
    let details = violation
        .details
        .as_ref()
        .unwrap_or_else(|| panic!("fuzzy violation without details"));
    assert_eq!(details.original.as_deref(), Some("stok"));
}

#[tokio::test]
async fn test_pattern_match() {
    let snap = snapshot(vec![finance_rule(), selfharm_rule()]).await;
    let result = matcher().check(&snap, "I want to kill myself").await;

    assert_eq!(result.violations.len(), 1);
    let violation = &result.violations[0];
    assert_eq!(violation.rule_id, "selfharm");
    assert_eq!(violation.kind, MatchKind::Pattern);
    assert_eq!(violation.matched, "kill myself");
    assert_eq!(violation.confidence, 1.0);
}

#[tokio::test]
async fn test_pattern_matches_case_insensitively() {
    let snap = snapshot(vec![selfharm_rule()]).await;
    let result = matcher().check(&snap, "I want to KILL MYSELF").await;
    assert_eq!(result.violations.len(), 1);
    assert_eq!(result.violations[0].kind, MatchKind::Pattern);
}

#[tokio::test]
async fn test_semantic_match_fires_when_all_stages_empty() {
    let example = "Should I buy Tesla stock?";
    let input = "Should I put money in the market to grow wealth?";
    let lowered = input.to_lowercase();
    let embedder = Arc::new(StubEmbedder::new(&[
        (example, vec![1.0, 0.0, 0.0]),
        (lowered.as_str(), vec![0.9, 0.1, 0.0]),
    ]));
    let snap =
        snapshot_with_embedder(vec![finance_rule(), selfharm_rule()], embedder.as_ref()).await;
    let result = matcher_with_embedder(embedder).check(&snap, input).await;

    assert_eq!(result.violations.len(), 1);
    let violation = &result.violations[0];
    assert_eq!(violation.rule_id, "finance");
    assert_eq!(violation.kind, MatchKind::Semantic);
    assert_eq!(violation.matched, "semantic similarity");
    assert!(violation.confidence > 0.75);
    let details = violation
        .details
        .as_ref()
        .unwrap_or_else(|| panic!("semantic violation without details"));
    assert_eq!(details.matched_example.as_deref(), Some(example));
    assert!(details.similarity.is_some());
}

#[tokio::test]
async fn test_semantic_skipped_below_three_words() {
    let embedder = Arc::new(StubEmbedder::new(&[
        ("Should I buy Tesla stock?", vec![1.0, 0.0, 0.0]),
        ("gold bars", vec![1.0, 0.0, 0.0]),
    ]));
    let snap = snapshot_with_embedder(vec![finance_rule()], embedder.as_ref()).await;
    let result = matcher_with_embedder(embedder).check(&snap, "gold bars").await;
    assert!(result.violations.is_empty());
}

#[tokio::test]
async fn test_semantic_below_threshold_is_no_match() {
    let example = "Should I buy Tesla stock?";
    let input = "the weather is nice today";
    let embedder = Arc::new(StubEmbedder::new(&[
        (example, vec![1.0, 0.0, 0.0]),
        (input, vec![0.0, 1.0, 0.0]),
    ]));
    let snap = snapshot_with_embedder(vec![finance_rule()], embedder.as_ref()).await;
    let result = matcher_with_embedder(embedder).check(&snap, input).await;
    assert!(result.violations.is_empty());
}

#[tokio::test]
async fn test_embedding_failure_degrades_to_no_match() {
    let embedder = Arc::new(StubEmbedder::new(&[(
        "Should I buy Tesla stock?",
        vec![1.0, 0.0, 0.0]
    )]));
    let snap = snapshot_with_embedder(vec![finance_rule()], embedder.as_ref()).await;
    // The input has no stub vector, so encoding fails at stage 6.
    let result = matcher_with_embedder(embedder)
        .check(&snap, "completely unrelated sentence here")
        .await;
    assert!(result.violations.is_empty());
}

#[tokio::test]
async fn test_fuzzy_gated_off_by_earlier_match() {
    let snap = snapshot(vec![finance_rule()]).await;
    let result = matcher().check(&snap, "buy stock and also stok").await;

    assert!(!result.violations.is_empty());
    assert!(
        !result
            .violations
            .iter()
            .any(|v| v.kind == MatchKind::FuzzyKeyword)
    );
}

#[tokio::test]
async fn test_duplicate_evidence_reported_once() {
    let snap = snapshot(vec![finance_rule()]).await;
    let result = matcher().check(&snap, "stock stock stock").await;
    assert_eq!(result.violations.len(), 1);
}

#[tokio::test]
async fn test_violations_sorted_by_confidence() {
    let snap = snapshot(vec![finance_rule(), selfharm_rule()]).await;
    let result = matcher()
        .check(&snap, "I will kill myself over these stocks")
        .await;

    assert!(result.violations.len() >= 2);
    assert_eq!(result.violations[0].kind, MatchKind::Pattern);
    for pair in result.violations.windows(2) {
        assert!(pair[0].confidence >= pair[1].confidence);
    }
}

#[tokio::test]
async fn test_results_truncated_to_ten() {
    let keywords: Vec<String> = (0..12).map(|i| format!("badword{:02}", i)).collect();
    let rule = Rule {
        id: CompactString::from("many"),
        keywords: Some(keywords.clone()),
        examples: None,
        ..finance_rule()
    };
    let snap = snapshot(vec![rule]).await;
    let text = keywords.join(" ");
    let result = matcher().check(&snap, &text).await;
    assert_eq!(result.violations.len(), 10);
}

#[tokio::test]
async fn test_whitelisted_word_never_matches() {
    let mut rule = finance_rule();
    rule.keywords = Some(vec!["good".to_string(), "stock".to_string()]);
    rule.examples = None;
    let snap = snapshot(vec![rule]).await;

    let result = matcher().check(&snap, "this is good").await;
    assert!(result.violations.is_empty());
}

#[tokio::test]
async fn test_empty_snapshot_matches_nothing() {
    let snap = snapshot(vec![]).await;
    let result = matcher().check(&snap, "kill myself over stocks").await;
    assert!(result.violations.is_empty());
}

#[tokio::test]
async fn test_every_rule_id_exists_in_snapshot() {
    let snap = snapshot(vec![finance_rule(), selfharm_rule()]).await;
    let result = matcher()
        .check(&snap, "kill myself over tesla stocks")
        .await;
    assert!(!result.violations.is_empty());
    for violation in &result.violations {
        assert!(snap.rule(&violation.rule_id).is_some());
    }
}

#[tokio::test]
async fn test_confidence_always_in_unit_interval() {
    let snap = snapshot(vec![finance_rule(), selfharm_rule()]).await;
    for text in [
        "buy stocks now",
        "kill myself",
        "Is it good to stok some money?",
    ] {
        let result = matcher().check(&snap, text).await;
        for violation in &result.violations {
            assert!((0.0..=1.0).contains(&violation.confidence));
        }
    }
}

#[tokio::test]
async fn test_same_input_is_deterministic() {
    let snap = snapshot(vec![finance_rule(), selfharm_rule()]).await;
    let m = matcher();
    let text = "kill myself over tesla stocks and invests";
    let first = m.check(&snap, text).await;
    let second = m.check(&snap, text).await;
    assert_eq!(first, second);
}
