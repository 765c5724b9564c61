//! # Content Guard Library
//!
//! Content guardrail engine: rule compilation, multi-stage matching,
//! result caching and toxicity-classifier fallback.

pub mod cache;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod evaluator;
pub mod matcher;
pub mod oracle;
pub mod output;
pub mod rules;
pub mod stem;
pub mod text;
