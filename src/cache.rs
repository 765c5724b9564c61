//! Result caching keyed by text fingerprint.
//!
//! Check results are deterministic functions of `(text, snapshot)`, so
//! the cache is a pure performance optimization: every backend error is
//! logged and swallowed, and the engine stays correct with caching
//! disabled. Keys are `"guard:"` plus the MD5 hex digest of the raw
//! input, values are the serialized [`CheckResult`], entries expire
//! after the configured TTL (default 300 seconds).
//!
//! The preferred backend is Redis; when it is unreachable at startup the
//! cache degrades to an in-process store with the same TTL semantics and
//! a clear-half-when-full eviction strategy.

use std::{
    collections::HashMap,
    sync::RwLock,
    time::{Duration, Instant}
};

use redis::{AsyncCommands, aio::ConnectionManager};
use tracing::{info, warn};

use crate::{config::RedisConfig, error::cache_error, rules::types::CheckResult};

/// In-process entry cap before eviction kicks in.
const MEMORY_CAPACITY: usize = 1000;

/// How long to wait for the initial Redis connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Cache key for a text: `"guard:"` plus the MD5 hex digest.
pub fn fingerprint(text: &str) -> String {
    format!("guard:{:x}", md5::compute(text))
}

/// Fingerprint-keyed store for serialized check results.
pub struct ResultCache {
    backend: Backend,
    ttl:     Duration
}

enum Backend {
    Redis(ConnectionManager),
    Memory(RwLock<MemoryCache>),
    Disabled
}

impl ResultCache {
    /// Connect to Redis, degrading to the in-process store when the
    /// connection cannot be established quickly.
    pub async fn connect(config: &RedisConfig, ttl_secs: u64) -> Self {
        let ttl = Duration::from_secs(ttl_secs);
        let url = config.url();
        let manager = match redis::Client::open(url.as_str()) {
            Ok(client) => {
                tokio::time::timeout(CONNECT_TIMEOUT, ConnectionManager::new(client)).await
            }
            Err(e) => {
                warn!(%e, "Invalid Redis configuration, using in-process cache");
                return Self::memory(ttl_secs);
            }
        };
        match manager {
            Ok(Ok(connection)) => {
                info!(host = %config.host, port = config.port, "Redis connection established");
                Self {
                    backend: Backend::Redis(connection),
                    ttl
                }
            }
            Ok(Err(e)) => {
                warn!(%e, "Redis connection failed, using in-process cache");
                Self::memory(ttl_secs)
            }
            Err(_) => {
                warn!("Redis connection timed out, using in-process cache");
                Self::memory(ttl_secs)
            }
        }
    }

    /// In-process cache with the given TTL.
    pub fn memory(ttl_secs: u64) -> Self {
        Self {
            backend: Backend::Memory(RwLock::new(MemoryCache::new(MEMORY_CAPACITY))),
            ttl:     Duration::from_secs(ttl_secs)
        }
    }

    /// No-op cache: every lookup misses, every store is dropped.
    pub fn disabled() -> Self {
        Self {
            backend: Backend::Disabled,
            ttl:     Duration::ZERO
        }
    }

    /// Backend name for health reporting.
    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Redis(_) => "redis",
            Backend::Memory(_) => "memory",
            Backend::Disabled => "disabled"
        }
    }

    /// Look up the cached result for `text`. Any backend or decode error
    /// is a miss.
    pub async fn get(&self, text: &str) -> Option<CheckResult> {
        let key = fingerprint(text);
        let payload = match &self.backend {
            Backend::Disabled => return None,
            Backend::Memory(store) => store.read().ok()?.get(&key, self.ttl),
            Backend::Redis(manager) => {
                let mut connection = manager.clone();
                match connection.get::<_, Option<String>>(&key).await {
                    Ok(value) => value,
                    Err(e) => {
                        let error = cache_error(format!("Redis get error: {}", e));
                        warn!(%error, "Cache read failed");
                        None
                    }
                }
            }
        }?;
        match serde_json::from_str(&payload) {
            Ok(result) => Some(result),
            Err(e) => {
                let error = cache_error(format!("Undecodable cache entry: {}", e));
                warn!(%error, "Discarding cache entry");
                None
            }
        }
    }

    /// Store the result for `text` with the configured TTL. Errors are
    /// logged and swallowed.
    pub async fn put(&self, text: &str, result: &CheckResult) {
        let payload = match serde_json::to_string(result) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(%e, "Failed to serialize check result for caching");
                return;
            }
        };
        let key = fingerprint(text);
        match &self.backend {
            Backend::Disabled => {}
            Backend::Memory(store) => {
                if let Ok(mut store) = store.write() {
                    store.insert(key, payload);
                }
            }
            Backend::Redis(manager) => {
                let mut connection = manager.clone();
                if let Err(e) = connection
                    .set_ex::<_, _, ()>(&key, payload, self.ttl.as_secs())
                    .await
                {
                    let error = cache_error(format!("Redis set error: {}", e));
                    warn!(%error, "Cache write failed");
                }
            }
        }
    }

    /// Whether the backend currently answers requests.
    pub async fn ping(&self) -> bool {
        match &self.backend {
            Backend::Disabled => false,
            Backend::Memory(_) => true,
            Backend::Redis(manager) => {
                let mut connection = manager.clone();
                let response: Result<String, _> =
                    redis::cmd("PING").query_async(&mut connection).await;
                response.is_ok()
            }
        }
    }
}

/// In-process store mirroring the Redis semantics: TTL on read, capped
/// size with clear-half eviction.
struct MemoryCache {
    entries:  HashMap<String, (Instant, String)>,
    max_size: usize
}

impl MemoryCache {
    fn new(max_size: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(max_size),
            max_size
        }
    }

    fn get(&self, key: &str, ttl: Duration) -> Option<String> {
        let (inserted_at, payload) = self.entries.get(key)?;
        if inserted_at.elapsed() > ttl {
            return None;
        }
        Some(payload.clone())
    }

    /// Insert a serialized result
    ///
    /// # Notes
    ///
    /// - Simple eviction: clear half when full
    fn insert(&mut self, key: String, payload: String) {
        if self.entries.len() >= self.max_size {
            let keys: Vec<_> = self
                .entries
                .keys()
                .take(self.max_size / 2)
                .cloned()
                .collect();
            for key in keys {
                self.entries.remove(&key);
            }
        }
        self.entries.insert(key, (Instant::now(), payload));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_deterministic() {
        assert_eq!(fingerprint("hello"), fingerprint("hello"));
        assert_ne!(fingerprint("hello"), fingerprint("hello!"));
    }

    #[test]
    fn test_fingerprint_prefix() {
        assert!(fingerprint("x").starts_with("guard:"));
    }

    #[test]
    fn test_memory_cache_ttl_expiry() {
        let mut store = MemoryCache::new(10);
        store.insert("k".to_string(), "v".to_string());
        assert_eq!(
            store.get("k", Duration::from_secs(60)),
            Some("v".to_string())
        );
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(store.get("k", Duration::from_millis(1)), None);
    }

    #[test]
    fn test_memory_cache_eviction() {
        let mut store = MemoryCache::new(4);
        for i in 0..5 {
            store.insert(format!("k{}", i), "v".to_string());
        }
        assert!(store.entries.len() <= 4);
        assert!(store.get("k4", Duration::from_secs(60)).is_some());
    }
}
