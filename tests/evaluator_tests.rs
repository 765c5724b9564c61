// SPDX-FileCopyrightText: 2025 RAprogramm
// SPDX-License-Identifier: MIT

use std::{io::Write, sync::Arc};

use content_guard::{
    cache::ResultCache,
    config::Config,
    embedding::DisabledEmbedder,
    evaluator::{BatchItem, Evaluator, MAX_BATCH_SIZE, Status},
    rules::{MatchKind, synonyms::StaticSynonyms},
    text::{Analyzer, Token}
};
use tempfile::NamedTempFile;

const RULES: &str = r#"{
  "rules": [
    {
      "id": "finance",
      "category": "financial_advice",
      "description": "Financial advice requests",
      "keywords": ["invest", "stock"]
    },
    {
      "id": "selfharm",
      "description": "Self-harm statements",
      "response": "Please reach out for help.",
      "patterns": ["\\bkill myself\\b"]
    }
  ]
}"#;

fn write_rules(content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".json")
        .tempfile()
        .unwrap_or_else(|e| panic!("tempfile: {}", e));
    file.write_all(content.as_bytes())
        .unwrap_or_else(|e| panic!("write: {}", e));
    file.flush().unwrap_or_else(|e| panic!("flush: {}", e));
    file
}

/// Evaluator with a memory cache and a classifier URL that refuses
/// connections, so unmatched texts take the warning path.
async fn evaluator(rules: &NamedTempFile) -> Evaluator {
    let mut config = Config::default();
    config.engine.rules_path = rules.path().display().to_string();
    config.classifier.url = String::from("http://127.0.0.1:9/predict");
    config.classifier.timeout_secs = 0.5;
    Evaluator::from_config_with_cache(&config, ResultCache::memory(300))
        .await
        .unwrap_or_else(|e| panic!("evaluator: {}", e))
}

#[tokio::test]
async fn test_empty_input_is_invalid() {
    let rules = write_rules(RULES);
    let evaluator = evaluator(&rules).await;
    let response = evaluator.check("", None).await;

    assert_eq!(response.status, Status::Invalid);
    assert!(response.violations.is_none());
    assert!(response.metadata.is_none());
    assert!(!response.request_id.is_empty());
}

#[tokio::test]
async fn test_whitespace_input_is_invalid() {
    let rules = write_rules(RULES);
    let evaluator = evaluator(&rules).await;
    let response = evaluator.check("   \n\t", None).await;
    assert_eq!(response.status, Status::Invalid);
}

#[tokio::test]
async fn test_violation_includes_rule_details() {
    let rules = write_rules(RULES);
    let evaluator = evaluator(&rules).await;
    let response = evaluator.check("should I buy this stock", None).await;

    assert_eq!(response.status, Status::Violation);
    assert_eq!(response.message, "Content policy violation detected");
    let violations = response
        .violations
        .as_ref()
        .unwrap_or_else(|| panic!("violation response without violations"));
    assert_eq!(violations[0].kind, MatchKind::Keyword);

    let details = response
        .rule_details
        .as_ref()
        .unwrap_or_else(|| panic!("violation response without rule details"));
    let finance = details
        .get("finance")
        .unwrap_or_else(|| panic!("missing finance details"));
    assert_eq!(finance.description, "Financial advice requests");
    assert_eq!(finance.response, "This content violates our guidelines.");

    let metadata = response
        .metadata
        .as_ref()
        .unwrap_or_else(|| panic!("violation response without metadata"));
    assert!(metadata.processing_time_ms.is_some());
}

#[tokio::test]
async fn test_rule_response_passthrough() {
    let rules = write_rules(RULES);
    let evaluator = evaluator(&rules).await;
    let response = evaluator.check("I want to kill myself", None).await;

    assert_eq!(response.status, Status::Violation);
    let details = response
        .rule_details
        .as_ref()
        .unwrap_or_else(|| panic!("violation response without rule details"));
    let selfharm = details
        .get("selfharm")
        .unwrap_or_else(|| panic!("missing selfharm details"));
    assert_eq!(selfharm.response, "Please reach out for help.");
}

#[tokio::test]
async fn test_unmatched_text_with_unreachable_classifier_is_warning() {
    let rules = write_rules(RULES);
    let evaluator = evaluator(&rules).await;
    let response = evaluator.check("Hello there.", None).await;

    assert_eq!(response.status, Status::Warning);
    assert!(response.message.contains("human review"));
    let metadata = response
        .metadata
        .as_ref()
        .unwrap_or_else(|| panic!("warning response without metadata"));
    assert!(metadata.error.is_some());
}

#[tokio::test]
async fn test_cached_result_is_reused() {
    let rules = write_rules(RULES);
    let evaluator = evaluator(&rules).await;
    let first = evaluator.check("buy more stock", None).await;
    let second = evaluator.check("buy more stock", None).await;

    assert_eq!(first.status, Status::Violation);
    assert_eq!(second.status, Status::Violation);
    assert_eq!(first.violations, second.violations);
    assert_ne!(first.request_id, second.request_id);
}

#[tokio::test]
async fn test_batch_empty_is_rejected() {
    let rules = write_rules(RULES);
    let evaluator = evaluator(&rules).await;
    assert!(evaluator.batch_check(Vec::new()).await.is_err());
}

#[tokio::test]
async fn test_batch_over_limit_is_rejected() {
    let rules = write_rules(RULES);
    let evaluator = evaluator(&rules).await;
    let items = vec![
        BatchItem {
            text:    "stock".to_string(),
            context: None
        };
        MAX_BATCH_SIZE + 1
    ];
    assert!(evaluator.batch_check(items).await.is_err());
}

#[tokio::test]
async fn test_batch_processes_each_item() {
    let rules = write_rules(RULES);
    let evaluator = evaluator(&rules).await;
    let items = vec![
        BatchItem {
            text:    "buy this stock".to_string(),
            context: None
        },
        BatchItem {
            text:    "".to_string(),
            context: None
        },
        BatchItem {
            text:    "I want to kill myself".to_string(),
            context: None
        },
    ];
    let response = evaluator
        .batch_check(items)
        .await
        .unwrap_or_else(|e| panic!("batch: {}", e));

    assert_eq!(response.total_items, 3);
    assert_eq!(response.results[0].status, Status::Violation);
    assert_eq!(response.results[1].status, Status::Invalid);
    assert_eq!(response.results[2].status, Status::Violation);
    for (idx, result) in response.results.iter().enumerate() {
        assert_eq!(
            result.request_id,
            format!("{}-{}", response.batch_id, idx)
        );
    }
}

#[tokio::test]
async fn test_rules_listing() {
    let rules = write_rules(RULES);
    let evaluator = evaluator(&rules).await;
    let listing = evaluator.rules().await;

    assert_eq!(listing.total, 2);
    assert_eq!(listing.rules[0].id, "finance");
    assert_eq!(listing.rules[0].category, "financial_advice");
    assert_eq!(listing.rules[1].description, "Self-harm statements");
    assert!(listing.last_updated_ms.is_some());
}

#[tokio::test]
async fn test_reload_rules_reports_count() {
    let rules = write_rules(RULES);
    let evaluator = evaluator(&rules).await;
    let report = evaluator.reload_rules().await;

    assert!(report.success);
    assert_eq!(report.rule_count, 2);
    assert!(report.message.contains("2"));
}

#[tokio::test]
async fn test_health_report() {
    let rules = write_rules(RULES);
    let evaluator = evaluator(&rules).await;
    let report = evaluator.health().await;

    assert_eq!(report.status, "healthy");
    assert_eq!(report.rule_count, 2);
    assert_eq!(report.services.cache, "memory");
    assert_eq!(report.services.embedding, "disabled");
    assert!(report.services.classifier.contains("error"));
}

/// Analyzer that panics on every call, standing in for an unexpected
/// internal failure deep inside a matcher stage.
struct PanickingAnalyzer;

impl Analyzer for PanickingAnalyzer {
    fn analyze(&self, _text: &str) -> Vec<Token> {
        panic!("analyzer blew up")
    }
}

#[tokio::test]
async fn test_internal_panic_degrades_to_error_envelope() {
    let rules = write_rules(RULES);
    let mut config = Config::default();
    config.engine.rules_path = rules.path().display().to_string();
    config.classifier.url = String::from("http://127.0.0.1:9/predict");
    config.classifier.timeout_secs = 0.5;
    let evaluator = Evaluator::from_parts(
        &config,
        Arc::new(PanickingAnalyzer),
        Arc::new(StaticSynonyms::empty()),
        Arc::new(DisabledEmbedder),
        ResultCache::disabled()
    )
    .await
    .unwrap_or_else(|e| panic!("evaluator: {}", e));

    let response = evaluator.check("some ordinary text", None).await;

    assert_eq!(response.status, Status::Error);
    assert_eq!(response.message, "Processing failed");
    assert!(!response.request_id.is_empty());
    let metadata = response
        .metadata
        .as_ref()
        .unwrap_or_else(|| panic!("error response without metadata"));
    let detail = metadata
        .error
        .as_ref()
        .unwrap_or_else(|| panic!("error response without detail"));
    assert!(detail.contains(&response.request_id));
}

#[tokio::test]
async fn test_batch_item_panic_degrades_to_error_envelope() {
    let rules = write_rules(RULES);
    let mut config = Config::default();
    config.engine.rules_path = rules.path().display().to_string();
    config.classifier.url = String::from("http://127.0.0.1:9/predict");
    config.classifier.timeout_secs = 0.5;
    let evaluator = Evaluator::from_parts(
        &config,
        Arc::new(PanickingAnalyzer),
        Arc::new(StaticSynonyms::empty()),
        Arc::new(DisabledEmbedder),
        ResultCache::disabled()
    )
    .await
    .unwrap_or_else(|e| panic!("evaluator: {}", e));

    let response = evaluator
        .batch_check(vec![BatchItem {
            text:    "some ordinary text".to_string(),
            context: None
        }])
        .await
        .unwrap_or_else(|e| panic!("batch: {}", e));

    assert_eq!(response.total_items, 1);
    assert_eq!(response.results[0].status, Status::Error);
}

#[tokio::test]
async fn test_missing_rules_file_yields_empty_engine() {
    let mut config = Config::default();
    config.engine.rules_path = String::from("/nonexistent/guard-rules.json");
    config.classifier.url = String::from("http://127.0.0.1:9/predict");
    config.classifier.timeout_secs = 0.5;
    let evaluator = Evaluator::from_config_with_cache(&config, ResultCache::disabled())
        .await
        .unwrap_or_else(|e| panic!("evaluator: {}", e));

    let listing = evaluator.rules().await;
    assert_eq!(listing.total, 0);

    // With no rules everything falls through to the classifier.
    let response = evaluator.check("buy this stock", None).await;
    assert_eq!(response.status, Status::Warning);
}
