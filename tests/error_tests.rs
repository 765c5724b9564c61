// SPDX-FileCopyrightText: 2025 RAprogramm
// SPDX-License-Identifier: MIT

use std::io::{Error, ErrorKind};

use content_guard::error::{
    cache_error, classifier_api_error, config_error, embedding_error, evaluation_error,
    file_read_error, invalid_input_error, rules_parse_error
};

#[test]
fn test_invalid_input_error_message() {
    let error = invalid_input_error();
    assert!(error.to_string().contains("empty or whitespace"));
}

#[test]
fn test_file_read_error_includes_path() {
    let io = Error::new(ErrorKind::NotFound, "no such file");
    let error = file_read_error("/etc/rules.json", io);
    let message = error.to_string();
    assert!(message.contains("/etc/rules.json"));
    assert!(message.contains("no such file"));
}

#[test]
fn test_rules_parse_error_includes_path_and_reason() {
    let error = rules_parse_error("rules.yaml", "unexpected token");
    let message = error.to_string();
    assert!(message.contains("rules.yaml"));
    assert!(message.contains("unexpected token"));
}

#[test]
fn test_pattern_compile_error_includes_rule_id() {
    let regex_error = regex::Regex::new("[unclosed")
        .err()
        .unwrap_or_else(|| panic!("pattern should not compile"));
    let error = content_guard::error::pattern_compile_error("selfharm", &regex_error);
    assert!(error.to_string().contains("selfharm"));
}

#[test]
fn test_embedding_error_message() {
    let error = embedding_error("model server down");
    assert!(error.to_string().contains("model server down"));
}

#[test]
fn test_cache_error_message() {
    let error = cache_error("redis timeout");
    assert!(error.to_string().contains("redis timeout"));
}

#[test]
fn test_classifier_api_error_message() {
    let error = classifier_api_error("API error: 503");
    assert!(error.to_string().contains("503"));
}

#[test]
fn test_config_error_message() {
    let error = config_error("invalid batch size");
    assert!(error.to_string().contains("invalid batch size"));
}

#[test]
fn test_evaluation_error_includes_request_id() {
    let error = evaluation_error("1730000000000-deadbeef", "matcher panicked");
    let message = error.to_string();
    assert!(message.contains("1730000000000-deadbeef"));
    assert!(message.contains("matcher panicked"));
}
