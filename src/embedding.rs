//! Embedding oracle seam for the semantic stage.
//!
//! The engine treats the embedding model as an opaque `encode(text)`
//! returning a fixed-dimension vector; it only ever computes dot products
//! and norms over the result. [`HttpEmbedder`] talks to a model server
//! (sentence-transformers style) over HTTP; tests and embedders of the
//! library can provide their own [`Embedder`] implementation.
//!
//! # Wire contract
//!
//! `POST {url} {"model": "...", "text": "..."}` → `{"embedding": [f32]}`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AppResult, embedding_error, http_error};

/// Opaque text encoder used by the rule compiler and the semantic stage.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Encode `text` into a vector. All vectors from one embedder share a
    /// dimension and are comparable under cosine similarity.
    async fn encode(&self, text: &str) -> AppResult<Vec<f32>>;

    /// Whether the embedder can serve requests at all. When false the
    /// compiler skips embedding work instead of logging one failure per
    /// example.
    fn available(&self) -> bool {
        true
    }
}

/// HTTP client for an embedding model server.
pub struct HttpEmbedder {
    client: reqwest::Client,
    url:    String,
    model:  String
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    text:  &'a str
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>
}

impl HttpEmbedder {
    pub fn new(url: impl Into<String>, model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            url: url.into(),
            model: model.into()
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn encode(&self, text: &str) -> AppResult<Vec<f32>> {
        let request = EmbedRequest {
            model: &self.model,
            text
        };
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(http_error)?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(embedding_error(format!(
                "Embedding API error {}: {}",
                status, body
            )));
        }
        let result: EmbedResponse = response.json().await.map_err(http_error)?;
        if result.embedding.is_empty() {
            return Err(embedding_error("Embedding API returned an empty vector"));
        }
        Ok(result.embedding)
    }
}

/// Placeholder used when no embedding endpoint is configured. The
/// semantic stage contributes nothing in that case.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    async fn encode(&self, _text: &str) -> AppResult<Vec<f32>> {
        Err(embedding_error("No embedding endpoint configured"))
    }

    fn available(&self) -> bool {
        false
    }
}

/// Cosine similarity between two vectors.
///
/// Returns 0 for mismatched dimensions or zero-norm inputs, which keeps
/// degenerate embeddings below every rule threshold.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
