//! Toxicity classifier client.
//!
//! The classifier is a black-box scoring oracle behind an HTTP endpoint:
//! `POST {url} {"text": "..."}` returns six category scores in [0, 1],
//! with missing keys meaning 0. The client never returns an error to the
//! caller; it yields either scores or an error envelope after exactly
//! one retry, and the evaluator maps the envelope to a `warning`
//! verdict.
//!
//! # Retry Behavior
//!
//! Any failure - non-200 status, timeout, connection error, undecodable
//! body - triggers a single immediate retry. A second failure produces
//! the error envelope.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    config::ClassifierConfig,
    error::{AppResult, classifier_api_error}
};

/// Health probe timeout, deliberately shorter than the request timeout.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(1);

/// Category scores returned by the classifier. Missing keys default
/// to 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ToxicityScores {
    #[serde(default)]
    pub toxic:         f32,
    #[serde(default)]
    pub severe_toxic:  f32,
    #[serde(default)]
    pub obscene:       f32,
    #[serde(default)]
    pub threat:        f32,
    #[serde(default)]
    pub insult:        f32,
    #[serde(default)]
    pub identity_hate: f32
}

impl ToxicityScores {
    /// Highest-scoring category. Ties resolve to the first category in
    /// declaration order.
    pub fn max_score(&self) -> (&'static str, f32) {
        let pairs = [
            ("toxic", self.toxic),
            ("severe_toxic", self.severe_toxic),
            ("obscene", self.obscene),
            ("threat", self.threat),
            ("insult", self.insult),
            ("identity_hate", self.identity_hate),
        ];
        let mut best = pairs[0];
        for pair in &pairs[1..] {
            if pair.1 > best.1 {
                best = *pair;
            }
        }
        best
    }
}

/// Outcome of a classification request.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierOutcome {
    Scores(ToxicityScores),
    /// Human-readable reason the classifier could not score the text.
    Error(String)
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    text: &'a str
}

/// HTTP client for the toxicity classifier with a bounded timeout and a
/// single retry.
pub struct ClassifierClient {
    client: reqwest::Client,
    url:    String
}

impl ClassifierClient {
    pub fn new(config: &ClassifierConfig) -> Self {
        let timeout = Duration::from_secs_f64(config.timeout_secs.max(0.1));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            url: config.url.clone()
        }
    }

    /// Score `text`, retrying once on any failure.
    pub async fn classify(&self, text: &str) -> ClassifierOutcome {
        match self.attempt(text).await {
            Ok(scores) => ClassifierOutcome::Scores(scores),
            Err(first) => {
                info!(reason = %first, "Retrying classifier request after error");
                match self.attempt(text).await {
                    Ok(scores) => ClassifierOutcome::Scores(scores),
                    Err(error) => {
                        warn!(%error, "Toxic classifier unavailable");
                        ClassifierOutcome::Error(error.to_string())
                    }
                }
            }
        }
    }

    async fn attempt(&self, text: &str) -> AppResult<ToxicityScores> {
        let response = self
            .client
            .post(&self.url)
            .json(&ClassifyRequest {
                text
            })
            .send()
            .await;
        match response {
            Ok(response) if response.status().is_success() => response
                .json()
                .await
                .map_err(|e| classifier_api_error(format!("Classifier decode error: {}", e))),
            Ok(response) => Err(classifier_api_error(format!(
                "API error: {}",
                response.status().as_u16()
            ))),
            Err(e) if e.is_timeout() => Err(classifier_api_error("Classifier API timeout")),
            Err(e) => Err(classifier_api_error(format!("Classifier error: {}", e)))
        }
    }

    /// Probe the classifier's sibling health endpoint.
    pub async fn health(&self) -> Result<(), String> {
        let url = self.url.replace("/predict", "/health");
        let response = self
            .client
            .get(&url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .map_err(|e| format!("error: {}", e))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("error: {}", response.status().as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ToxicityScores;

    #[test]
    fn test_max_score_picks_highest() {
        let scores = ToxicityScores {
            toxic: 0.2,
            threat: 0.9,
            ..ToxicityScores::default()
        };
        assert_eq!(scores.max_score(), ("threat", 0.9));
    }

    #[test]
    fn test_max_score_tie_prefers_first_category() {
        let scores = ToxicityScores {
            toxic: 0.5,
            insult: 0.5,
            ..ToxicityScores::default()
        };
        assert_eq!(scores.max_score(), ("toxic", 0.5));
    }

    #[test]
    fn test_missing_keys_default_to_zero() {
        let scores: ToxicityScores = serde_json::from_str(r#"{"toxic": 0.3}"#)
            .unwrap_or_default();
        assert_eq!(scores.toxic, 0.3);
        assert_eq!(scores.threat, 0.0);
        assert_eq!(scores.max_score(), ("toxic", 0.3));
    }
}
