//! Configuration loading and management.
//!
//! Configuration is loaded from multiple sources with the following
//! precedence (highest to lowest):
//!
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. `.content-guard.toml` in current directory
//! 4. `~/.config/content-guard/config.toml`
//! 5. Default values
//!
//! # Configuration File Format
//!
//! ```toml
//! [engine]
//! rules_path = "rules.json"
//! cache_expiry = 300           # seconds
//! max_workers = 4
//!
//! [redis]
//! host = "localhost"
//! port = 6379
//! db = 0
//!
//! [classifier]
//! url = "http://localhost:8001/predict"
//! timeout_secs = 5.0
//!
//! [embedding]
//! model = "all-mpnet-base-v2"
//! url = "http://localhost:8002/encode"
//!
//! [server]
//! host = "0.0.0.0"
//! port = 8000
//! workers = 1
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `RULES_PATH` | Path to the rule document |
//! | `CACHE_EXPIRY` | Result cache TTL in seconds |
//! | `MAX_WORKERS` | Matcher worker pool size |
//! | `SYNONYMS_PATH` | Optional synonym table for keyword expansion |
//! | `REDIS_HOST` / `REDIS_PORT` / `REDIS_DB` / `REDIS_PASSWORD` | Cache backend |
//! | `TOXIC_CLASSIFIER_URL` | Toxicity classifier endpoint |
//! | `API_TIMEOUT` | Classifier timeout in seconds (float) |
//! | `EMBEDDING_MODEL` / `EMBEDDING_URL` | Embedding oracle |
//! | `HOST` / `PORT` / `WORKERS` | Advertised front-end bind settings |
//! | `LOG_LEVEL` | Log filter, read by the binary at startup |

use std::{env, fs, path::PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::error::{AppResult, config_error};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub engine:     EngineConfig,
    #[serde(default)]
    pub redis:      RedisConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub embedding:  EmbeddingConfig,
    #[serde(default)]
    pub server:     ServerConfig
}

/// Matching engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Path to the declarative rule document.
    pub rules_path:    String,
    /// Result cache TTL in seconds.
    pub cache_expiry:  u64,
    /// Matcher worker pool size.
    pub max_workers:   usize,
    /// Optional synonym table for compile-time keyword expansion.
    pub synonyms_path: Option<String>
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rules_path:    String::from("rules.json"),
            cache_expiry:  300,
            max_workers:   4,
            synonyms_path: None
        }
    }
}

/// Redis cache backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub host:     String,
    pub port:     u16,
    pub db:       i64,
    pub password: Option<String>
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host:     String::from("localhost"),
            port:     6379,
            db:       0,
            password: None
        }
    }
}

impl RedisConfig {
    /// Connection URL in `redis://` form.
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db)
        }
    }
}

/// Toxicity classifier configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    /// Prediction endpoint.
    pub url:          String,
    /// Per-request timeout in seconds.
    pub timeout_secs: f64
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            url:          String::from("http://localhost:8001/predict"),
            timeout_secs: 5.0
        }
    }
}

/// Embedding oracle configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    /// Model identifier passed to the embedding server.
    pub model: String,
    /// Encode endpoint. Without it the semantic stage is disabled.
    pub url:   Option<String>
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: String::from("all-mpnet-base-v2"),
            url:   None
        }
    }
}

/// Bind settings advertised to HTTP front-ends embedding the library.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host:    String,
    pub port:    u16,
    pub workers: usize
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host:    String::from("0.0.0.0"),
            port:    8000,
            workers: 1
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Config file in current directory (.content-guard.toml)
    /// 3. Config file in home directory (~/.config/content-guard/config.toml)
    /// 4. Default values
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        // Try to load from home directory config
        if let Some(home) = env::var_os("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("content-guard")
                .join("config.toml");

            if home_config.exists() {
                let content = fs::read_to_string(&home_config)
                    .map_err(|e| config_error(format!("Failed to read config file: {}", e)))?;
                config = toml::from_str(&content)
                    .map_err(|e| config_error(format!("Invalid config file: {}", e)))?;
            }
        }

        // Try to load from current directory config (overrides home config)
        let local_config = PathBuf::from(".content-guard.toml");
        if local_config.exists() {
            let content = fs::read_to_string(&local_config)
                .map_err(|e| config_error(format!("Failed to read config file: {}", e)))?;
            config = toml::from_str(&content)
                .map_err(|e| config_error(format!("Invalid config file: {}", e)))?;
        }

        config.apply_env();
        Ok(config)
    }

    /// Override file/default values with environment variables.
    fn apply_env(&mut self) {
        if let Ok(path) = env::var("RULES_PATH") {
            self.engine.rules_path = path;
        }
        set_parsed(&mut self.engine.cache_expiry, "CACHE_EXPIRY");
        set_parsed(&mut self.engine.max_workers, "MAX_WORKERS");
        if let Ok(path) = env::var("SYNONYMS_PATH") {
            self.engine.synonyms_path = Some(path);
        }

        if let Ok(host) = env::var("REDIS_HOST") {
            self.redis.host = host;
        }
        set_parsed(&mut self.redis.port, "REDIS_PORT");
        set_parsed(&mut self.redis.db, "REDIS_DB");
        if let Ok(password) = env::var("REDIS_PASSWORD") {
            self.redis.password = Some(password);
        }

        if let Ok(url) = env::var("TOXIC_CLASSIFIER_URL") {
            self.classifier.url = url;
        }
        set_parsed(&mut self.classifier.timeout_secs, "API_TIMEOUT");

        if let Ok(model) = env::var("EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Ok(url) = env::var("EMBEDDING_URL") {
            self.embedding.url = Some(url);
        }

        if let Ok(host) = env::var("HOST") {
            self.server.host = host;
        }
        set_parsed(&mut self.server.port, "PORT");
        set_parsed(&mut self.server.workers, "WORKERS");
    }
}

/// Parse an environment variable into `target`, keeping the current
/// value (with a log) when the variable is present but malformed.
fn set_parsed<T: std::str::FromStr>(target: &mut T, name: &str) {
    let Ok(raw) = env::var(name) else {
        return;
    };
    match raw.parse() {
        Ok(value) => *target = value,
        Err(_) => {
            warn!(%name, %raw, "Ignoring unparseable environment variable");
        }
    }
}
