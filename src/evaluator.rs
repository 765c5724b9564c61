//! Evaluation orchestration: cache, matcher, classifier, verdicts.
//!
//! The [`Evaluator`] ties the subsystems together for one text:
//!
//! 1. Reject empty or whitespace input (`invalid`)
//! 2. Refresh the rule snapshot if the document changed
//! 3. Consult the result cache; on miss run the matcher and store
//! 4. Violations present → `violation` with per-rule details
//! 5. Otherwise ask the toxicity classifier: an error envelope becomes
//!    `warning`, scores map to `safe` below the toxicity threshold and
//!    `unsafe` otherwise
//!
//! Every response carries a request id (millisecond timestamp plus a
//! random tail) and the processing time. Auxiliary failures degrade to
//! conservative verdicts; only malformed requests are hard rejections.
//! The matcher and cache work of each check runs in its own task, so an
//! unexpected panic surfaces as an `error` envelope instead of crossing
//! the API boundary.

use std::{
    path::Path,
    sync::Arc,
    time::{Instant, SystemTime, UNIX_EPOCH}
};

use compact_str::CompactString;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::{
    cache::ResultCache,
    config::Config,
    embedding::{DisabledEmbedder, Embedder, HttpEmbedder},
    error::{AppResult, config_error, evaluation_error, invalid_input_error},
    matcher::Matcher,
    oracle::{ClassifierClient, ClassifierOutcome, ToxicityScores},
    rules::{
        RuleEngine, Violation,
        synonyms::{StaticSynonyms, SynonymSource}
    },
    text::{Analyzer, SimpleAnalyzer}
};

/// Toxicity score below which content is considered safe.
pub const DEFAULT_TOXICITY_THRESHOLD: f32 = 0.1;

/// Maximum number of items accepted by a batch check.
pub const MAX_BATCH_SIZE: usize = 100;

/// Response returned when a rule has no `response` of its own.
const DEFAULT_RULE_RESPONSE: &str = "This content violates our guidelines.";

/// Final verdict for a checked text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Violation,
    Safe,
    Unsafe,
    Warning,
    Invalid,
    Error
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Violation => write!(f, "violation"),
            Self::Safe => write!(f, "safe"),
            Self::Unsafe => write!(f, "unsafe"),
            Self::Warning => write!(f, "warning"),
            Self::Invalid => write!(f, "invalid"),
            Self::Error => write!(f, "error")
        }
    }
}

/// Description and user-facing response of a violated rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDetails {
    pub description: String,
    pub response:    String
}

/// Per-request metadata attached to a response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toxicity_scores:    Option<ToxicityScores>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error:              Option<String>
}

/// Outcome of checking one text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResponse {
    pub status:       Status,
    pub message:      String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violations:   Option<Vec<Violation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_details: Option<IndexMap<CompactString, RuleDetails>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata:     Option<ResponseMetadata>,
    pub request_id:   String
}

/// One item of a batch request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    pub text:    String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>
}

/// Outcome of a batch check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub batch_id:           String,
    pub results:            Vec<CheckResponse>,
    pub total_items:        usize,
    pub processing_time_ms: u64
}

/// One entry of the rules listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSummary {
    pub id:          CompactString,
    pub description: String,
    pub category:    CompactString
}

/// Rules listing with reload bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesListing {
    pub rules:           Vec<RuleSummary>,
    pub total:           usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_ms: Option<u64>
}

/// Per-subsystem statuses for health reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthServices {
    pub cache:      String,
    pub classifier: String,
    pub embedding:  String
}

/// Liveness report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status:     String,
    pub version:    String,
    pub rule_count: usize,
    /// Advertised bind address for front-ends embedding the library.
    pub server:     String,
    pub services:   HealthServices
}

/// Outcome of a forced rules reload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadReport {
    pub success:    bool,
    pub message:    String,
    pub rule_count: usize
}

/// Map classifier scores to a verdict and message.
pub fn verdict_for(scores: &ToxicityScores) -> (Status, String) {
    let (category, max_score) = scores.max_score();
    if max_score < DEFAULT_TOXICITY_THRESHOLD {
        (Status::Safe, String::from("Content is safe."))
    } else {
        (
            Status::Unsafe,
            format!(
                "Content may be unsafe (detected {}: {:.2})",
                category, max_score
            )
        )
    }
}

/// Unique request id: millisecond timestamp plus a random tail.
pub fn generate_request_id() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let tail: [u8; 4] = rand::random();
    format!(
        "{}-{:02x}{:02x}{:02x}{:02x}",
        timestamp, tail[0], tail[1], tail[2], tail[3]
    )
}

/// Orchestrates cache, matcher and classifier into final verdicts.
///
/// Cloning is cheap: all subsystems are shared behind [`Arc`]s, which is
/// what batch evaluation relies on to fan out.
#[derive(Clone)]
pub struct Evaluator {
    engine:     Arc<RuleEngine>,
    matcher:    Arc<Matcher>,
    cache:      Arc<ResultCache>,
    classifier: Arc<ClassifierClient>,
    embedder:   Arc<dyn Embedder>,
    server:     String
}

impl Evaluator {
    /// Build an evaluator from configuration with the bundled analyzer
    /// and synonym table, connecting to the configured cache backend.
    ///
    /// # Errors
    ///
    /// Fails when the matcher worker pool cannot be created.
    pub async fn from_config(config: &Config) -> AppResult<Self> {
        let cache = ResultCache::connect(&config.redis, config.engine.cache_expiry).await;
        Self::from_config_with_cache(config, cache).await
    }

    /// Build an evaluator from configuration with an explicit cache,
    /// used when caching is disabled from the command line.
    ///
    /// # Errors
    ///
    /// Fails when the matcher worker pool cannot be created.
    pub async fn from_config_with_cache(config: &Config, cache: ResultCache) -> AppResult<Self> {
        let embedder: Arc<dyn Embedder> = match &config.embedding.url {
            Some(url) => Arc::new(HttpEmbedder::new(
                url.clone(),
                config.embedding.model.clone()
            )),
            None => Arc::new(DisabledEmbedder)
        };
        let synonyms: Arc<dyn SynonymSource> = Arc::new(StaticSynonyms::from_optional_file(
            config.engine.synonyms_path.as_deref().map(Path::new)
        ));
        Self::from_parts(config, Arc::new(SimpleAnalyzer::new()), synonyms, embedder, cache).await
    }

    /// Build an evaluator from explicit subsystems.
    ///
    /// # Errors
    ///
    /// Fails when the matcher worker pool cannot be created.
    pub async fn from_parts(
        config: &Config,
        analyzer: Arc<dyn Analyzer>,
        synonyms: Arc<dyn SynonymSource>,
        embedder: Arc<dyn Embedder>,
        cache: ResultCache
    ) -> AppResult<Self> {
        let engine = Arc::new(
            RuleEngine::load(&config.engine.rules_path, synonyms, embedder.clone()).await
        );
        let matcher = Arc::new(Matcher::new(
            analyzer,
            embedder.clone(),
            config.engine.max_workers
        )?);
        Ok(Self {
            engine,
            matcher,
            cache: Arc::new(cache),
            classifier: Arc::new(ClassifierClient::new(&config.classifier)),
            embedder,
            server: format!("{}:{}", config.server.host, config.server.port)
        })
    }

    /// Check one text against the guardrails.
    pub async fn check(&self, text: &str, context: Option<&serde_json::Value>) -> CheckResponse {
        self.check_with_id(text, context, generate_request_id())
            .await
    }

    async fn check_with_id(
        &self,
        text: &str,
        _context: Option<&serde_json::Value>,
        request_id: String
    ) -> CheckResponse {
        let start = Instant::now();

        if text.trim().is_empty() {
            let error = invalid_input_error();
            return CheckResponse {
                status:       Status::Invalid,
                message:      error.to_string(),
                violations:   None,
                rule_details: None,
                metadata:     None,
                request_id
            };
        }

        info!(%request_id, preview = %preview(text), "Checking text");
        self.engine.ensure_fresh().await;
        let snapshot = self.engine.snapshot();

        // Run the matcher and cache work in a task of its own: a panic
        // inside a stage becomes a JoinError and degrades to an `error`
        // envelope, matching the batch path.
        let task = {
            let matcher = self.matcher.clone();
            let cache = self.cache.clone();
            let snapshot = snapshot.clone();
            let text = text.to_string();
            tokio::spawn(async move {
                match cache.get(&text).await {
                    Some(result) => result,
                    None => {
                        let result = matcher.check(&snapshot, &text).await;
                        cache.put(&text, &result).await;
                        result
                    }
                }
            })
        };
        let result = match task.await {
            Ok(result) => result,
            Err(e) => {
                let error = evaluation_error(&request_id, e.to_string());
                error!(%error, "Check processing failed");
                return CheckResponse {
                    status:       Status::Error,
                    message:      String::from("Processing failed"),
                    violations:   None,
                    rule_details: None,
                    metadata:     Some(ResponseMetadata {
                        processing_time_ms: Some(elapsed_ms(start)),
                        error: Some(error.to_string()),
                        ..ResponseMetadata::default()
                    }),
                    request_id
                };
            }
        };

        if !result.is_empty() {
            let mut rule_details: IndexMap<CompactString, RuleDetails> = IndexMap::new();
            for violation in &result.violations {
                if rule_details.contains_key(&violation.rule_id) {
                    continue;
                }
                if let Some(rule) = snapshot.rule(&violation.rule_id) {
                    rule_details.insert(
                        violation.rule_id.clone(),
                        RuleDetails {
                            description: rule.description.clone().unwrap_or_default(),
                            response:    rule
                                .response
                                .clone()
                                .unwrap_or_else(|| String::from(DEFAULT_RULE_RESPONSE))
                        }
                    );
                }
            }
            let top = &result.violations[0];
            info!(
                %request_id,
                rule_id = %top.rule_id,
                kind = %top.kind,
                matched = %top.matched,
                "Violation found"
            );
            return CheckResponse {
                status:       Status::Violation,
                message:      String::from("Content policy violation detected"),
                violations:   Some(result.violations),
                rule_details: Some(rule_details),
                metadata:     Some(ResponseMetadata {
                    processing_time_ms: Some(elapsed_ms(start)),
                    ..ResponseMetadata::default()
                }),
                request_id
            };
        }

        match self.classifier.classify(text).await {
            ClassifierOutcome::Error(reason) => {
                warn!(%request_id, %reason, "Classifier error, deferring to human review");
                CheckResponse {
                    status:       Status::Warning,
                    message:      String::from("Content requires human review (classifier error)"),
                    violations:   None,
                    rule_details: None,
                    metadata:     Some(ResponseMetadata {
                        processing_time_ms: Some(elapsed_ms(start)),
                        error: Some(reason),
                        ..ResponseMetadata::default()
                    }),
                    request_id
                }
            }
            ClassifierOutcome::Scores(scores) => {
                let (status, message) = verdict_for(&scores);
                let processing_time_ms = elapsed_ms(start);
                info!(%request_id, %status, processing_time_ms, "Check complete");
                CheckResponse {
                    status,
                    message,
                    violations: None,
                    rule_details: None,
                    metadata: Some(ResponseMetadata {
                        processing_time_ms: Some(processing_time_ms),
                        toxicity_scores: Some(scores),
                        ..ResponseMetadata::default()
                    }),
                    request_id
                }
            }
        }
    }

    /// Check up to [`MAX_BATCH_SIZE`] texts concurrently.
    ///
    /// Item failures degrade to per-item `error` responses; the batch
    /// itself fails only on size bounds.
    ///
    /// # Errors
    ///
    /// Fails when the batch is empty or exceeds [`MAX_BATCH_SIZE`].
    pub async fn batch_check(&self, items: Vec<BatchItem>) -> AppResult<BatchResponse> {
        if items.is_empty() || items.len() > MAX_BATCH_SIZE {
            return Err(config_error(format!(
                "Batch size must be between 1 and {}, got {}",
                MAX_BATCH_SIZE,
                items.len()
            )));
        }

        let start = Instant::now();
        let batch_id = generate_request_id();
        info!(%batch_id, items = items.len(), "Processing batch");

        let mut handles = Vec::with_capacity(items.len());
        for (idx, item) in items.into_iter().enumerate() {
            let evaluator = self.clone();
            let item_id = format!("{}-{}", batch_id, idx);
            handles.push(tokio::spawn(async move {
                evaluator
                    .check_with_id(&item.text, item.context.as_ref(), item_id)
                    .await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (idx, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(response) => results.push(response),
                Err(e) => {
                    let item_id = format!("{}-{}", batch_id, idx);
                    let error = evaluation_error(&item_id, e.to_string());
                    error!(%batch_id, idx, %error, "Batch item processing failed");
                    results.push(CheckResponse {
                        status:       Status::Error,
                        message:      format!("Processing error: {}", e),
                        violations:   None,
                        rule_details: None,
                        metadata:     Some(ResponseMetadata {
                            error: Some(error.to_string()),
                            ..ResponseMetadata::default()
                        }),
                        request_id:   item_id
                    });
                }
            }
        }

        let processing_time_ms = elapsed_ms(start);
        info!(%batch_id, processing_time_ms, "Batch complete");
        Ok(BatchResponse {
            batch_id,
            total_items: results.len(),
            results,
            processing_time_ms
        })
    }

    /// Liveness and subsystem statuses.
    pub async fn health(&self) -> HealthReport {
        let cache = if self.cache.ping().await {
            self.cache.backend_name().to_string()
        } else {
            String::from("unavailable")
        };
        let classifier = match self.classifier.health().await {
            Ok(()) => String::from("available"),
            Err(reason) => reason
        };
        let embedding = if self.embedder.available() {
            String::from("available")
        } else {
            String::from("disabled")
        };
        HealthReport {
            status: String::from("healthy"),
            version: env!("CARGO_PKG_VERSION").to_string(),
            rule_count: self.engine.rule_count(),
            server: self.server.clone(),
            services: HealthServices {
                cache,
                classifier,
                embedding
            }
        }
    }

    /// List loaded rules after refreshing the snapshot.
    pub async fn rules(&self) -> RulesListing {
        self.engine.ensure_fresh().await;
        let snapshot = self.engine.snapshot();
        let rules: Vec<RuleSummary> = snapshot
            .rules
            .iter()
            .map(|rule| RuleSummary {
                id:          rule.id.clone(),
                description: rule
                    .description
                    .clone()
                    .unwrap_or_else(|| String::from("No description")),
                category:    rule.category.clone()
            })
            .collect();
        RulesListing {
            total: rules.len(),
            rules,
            last_updated_ms: self.engine.last_reload().await.and_then(epoch_ms)
        }
    }

    /// Force a reload and recompilation of the rule document.
    pub async fn reload_rules(&self) -> ReloadReport {
        match self.engine.reload(true).await {
            Ok(_) => {
                let count = self.engine.rule_count();
                ReloadReport {
                    success:    true,
                    message:    format!("Reloaded {} rules", count),
                    rule_count: count
                }
            }
            Err(e) => {
                error!(%e, "Forced rules reload failed");
                ReloadReport {
                    success:    false,
                    message:    format!("Failed to reload rules: {}", e),
                    rule_count: self.engine.rule_count()
                }
            }
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn epoch_ms(time: SystemTime) -> Option<u64> {
    time.duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// First 50 characters of the input for request logs.
fn preview(text: &str) -> String {
    if text.chars().count() <= 50 {
        text.to_string()
    } else {
        let head: String = text.chars().take(50).collect();
        format!("{}...", head)
    }
}
