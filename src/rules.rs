//! Guardrail rule engine: loading, compilation and snapshot publication.
//!
//! This module owns the lifecycle of the declarative rule document. The
//! [`RuleEngine`] loads and validates the document, compiles it into
//! immutable matching indices, and publishes the result as a [`Snapshot`]
//! behind an atomic pointer swap.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────────┐     ┌──────────────┐
//! │ rules.json   │────▶│   Loader   │────▶│   Compiler   │
//! └──────────────┘     └────────────┘     └──────┬───────┘
//!                                                │ atomic swap
//!                                         ┌──────▼───────┐
//!                                         │   Snapshot   │──▶ readers
//!                                         └──────────────┘
//! ```
//!
//! Readers never lock: [`RuleEngine::snapshot`] hands out a shared
//! reference to the current snapshot, and in-flight checks keep running
//! on the snapshot they started with while a reload publishes a new one.
//!
//! # Hot reload
//!
//! [`RuleEngine::ensure_fresh`] compares the document's modification time
//! and rebuilds only when it advanced; [`RuleEngine::reload`] with
//! `force` rebuilds unconditionally. A reload failure keeps the previous
//! snapshot in service.

pub mod compile;
pub mod loader;
pub mod synonyms;
pub mod types;

use std::{path::PathBuf, sync::Arc, time::SystemTime};

use arc_swap::ArcSwap;
use tokio::sync::Mutex;
use tracing::error;
pub use types::{CheckResult, MatchKind, Rule, Snapshot, Violation, ViolationDetails};

use crate::{
    embedding::Embedder,
    error::AppResult,
    rules::{loader::Loader, synonyms::SynonymSource}
};

/// Owns the rule document lifecycle and the published snapshot.
pub struct RuleEngine {
    loader:   Mutex<Loader>,
    snapshot: ArcSwap<Snapshot>,
    synonyms: Arc<dyn SynonymSource>,
    embedder: Arc<dyn Embedder>
}

impl RuleEngine {
    /// Create an engine and perform the initial load.
    ///
    /// A missing document is not fatal: the engine starts with an empty
    /// snapshot and picks the file up when it appears. A malformed
    /// document is logged and likewise leaves the empty snapshot in
    /// place.
    pub async fn load(
        path: impl Into<PathBuf>,
        synonyms: Arc<dyn SynonymSource>,
        embedder: Arc<dyn Embedder>
    ) -> Self {
        let engine = Self {
            loader: Mutex::new(Loader::new(path.into())),
            snapshot: ArcSwap::from_pointee(Snapshot::empty()),
            synonyms,
            embedder
        };
        if let Err(e) = engine.reload(false).await {
            error!(%e, "Initial rules load failed, starting with empty rule set");
        }
        engine
    }

    /// Current snapshot. Lock-free; callers hold it for one check.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.load_full()
    }

    /// Reload the document if it changed, or unconditionally with
    /// `force`. Returns whether a new snapshot was published.
    ///
    /// # Errors
    ///
    /// Fails when the document exists but cannot be read or parsed; the
    /// previous snapshot stays published.
    pub async fn reload(&self, force: bool) -> AppResult<bool> {
        let mut loader = self.loader.lock().await;
        let Some(set) = loader.load(force)? else {
            return Ok(false);
        };
        let snapshot = compile::compile(&set, self.synonyms.as_ref(), self.embedder.as_ref()).await;
        self.snapshot.store(Arc::new(snapshot));
        Ok(true)
    }

    /// Reload if stale, logging failures instead of surfacing them.
    /// Called on every evaluation so edits to the document take effect
    /// without a restart.
    pub async fn ensure_fresh(&self) {
        if let Err(e) = self.reload(false).await {
            error!(%e, "Rules reload failed, keeping previous snapshot");
        }
    }

    /// Number of currently loaded rules.
    pub fn rule_count(&self) -> usize {
        self.snapshot.load().rules.len()
    }

    /// Modification time of the document at the last successful load.
    pub async fn last_reload(&self) -> Option<SystemTime> {
        self.loader.lock().await.last_reload()
    }
}
