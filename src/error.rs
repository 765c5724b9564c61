//! Error types and constructors for the content guardrail engine.
//!
//! This module provides error construction functions that create properly
//! formatted [`AppError`] instances with context-specific messages.
//!
//! # Error Categories
//!
//! - **Input errors**: empty or whitespace-only text submitted for checking
//! - **Load errors**: unreadable or unparseable rule documents
//! - **Pattern errors**: regular expressions that fail to compile
//! - **Embedding errors**: failures from the embedding oracle
//! - **Cache errors**: unreachable or misbehaving cache backends
//! - **Classifier errors**: toxicity classifier API failures
//! - **Config errors**: invalid configuration files or values

pub use masterror::{AppError, AppResult};

/// Create invalid input error for empty or whitespace text.
pub fn invalid_input_error() -> AppError {
    AppError::bad_request("Input text is empty or whitespace")
}

/// Create file read error with path context.
///
/// # Arguments
///
/// * `path` - The file path that failed to read
/// * `source` - The underlying IO error
pub fn file_read_error(path: &str, source: std::io::Error) -> AppError {
    AppError::internal(format!("Failed to read file '{}': {}", path, source))
}

/// Create rules document parse error with path context.
pub fn rules_parse_error(path: &str, message: impl Into<String>) -> AppError {
    AppError::bad_request(format!(
        "Failed to parse rules document '{}': {}",
        path,
        message.into()
    ))
}

/// Create pattern compile error for a single rule pattern.
pub fn pattern_compile_error(rule_id: &str, source: &regex::Error) -> AppError {
    AppError::bad_request(format!(
        "Invalid pattern in rule '{}': {}",
        rule_id, source
    ))
}

/// Create embedding oracle error.
pub fn embedding_error(message: impl Into<String>) -> AppError {
    AppError::service(message.into())
}

/// Create cache backend error.
pub fn cache_error(message: impl Into<String>) -> AppError {
    AppError::service(message.into())
}

/// Create toxicity classifier API error.
pub fn classifier_api_error(message: impl Into<String>) -> AppError {
    AppError::service(message.into())
}

/// Create HTTP error
///
/// # Notes
///
/// - Distinguishes timeouts and connection failures so retry and verdict
///   mapping can report the right reason
pub fn http_error(err: reqwest::Error) -> AppError {
    let msg = if err.is_timeout() {
        format!("Request timeout: {}", err)
    } else if err.is_connect() {
        format!("Connection failed: {}", err)
    } else if err.is_status() {
        format!("HTTP error {}: {}", err.status().unwrap_or_default(), err)
    } else {
        err.to_string()
    };
    AppError::service(msg)
}

/// Create config error
pub fn config_error(message: impl Into<String>) -> AppError {
    AppError::bad_request(message.into())
}

/// Create internal evaluation error with request context.
pub fn evaluation_error(request_id: &str, message: impl Into<String>) -> AppError {
    AppError::internal(format!(
        "Evaluation {} failed: {}",
        request_id,
        message.into()
    ))
}
