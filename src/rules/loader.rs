//! Rule document loading, validation and change tracking.
//!
//! Documents are JSON (`.json`) or YAML (`.yaml`/`.yml`) trees with a
//! top-level `rules` array and an optional `config` block. Validation is
//! per-rule: a rule with a missing or duplicate id, a non-compiling
//! pattern, an out-of-range threshold or an explicitly empty `examples`
//! array is logged and skipped without failing the load. A missing file
//! yields an empty rule set; only an unreadable or unparseable file is a
//! load error.

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    time::SystemTime
};

use compact_str::CompactString;
use regex::RegexBuilder;
use tracing::{error, info, warn};

use crate::{
    error::{AppResult, file_read_error, pattern_compile_error, rules_parse_error},
    rules::types::{
        DEFAULT_MIN_WORD_LENGTH_FOR_FUZZY, Rule, RuleDocument, RuleSet, builtin_whitelist
    }
};

/// Tracks a rule document on disk and reloads it when its modification
/// time advances.
pub struct Loader {
    path:        PathBuf,
    last_reload: Option<SystemTime>,
    initialized: bool
}

impl Loader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path:        path.into(),
            last_reload: None,
            initialized: false
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Modification time of the document at the last successful load.
    pub fn last_reload(&self) -> Option<SystemTime> {
        self.last_reload
    }

    /// Load the document if it changed since the last load.
    ///
    /// Returns `Ok(None)` when the file is unchanged and `force` is
    /// false. A missing file yields an empty [`RuleSet`] once, then
    /// `Ok(None)` until it reappears.
    ///
    /// # Errors
    ///
    /// Fails only when the file exists but cannot be read or parsed; the
    /// caller keeps operating on its previous snapshot in that case.
    pub fn load(&mut self, force: bool) -> AppResult<Option<RuleSet>> {
        let Ok(meta) = fs::metadata(&self.path) else {
            if self.initialized && self.last_reload.is_none() {
                return Ok(None);
            }
            error!(path = %self.path.display(), "Rules file not found, operating with empty rule set");
            self.initialized = true;
            self.last_reload = None;
            return Ok(Some(RuleSet::empty()));
        };

        let mtime = meta.modified().ok();
        if !force
            && self.initialized
            && let (Some(current), Some(last)) = (mtime, self.last_reload)
            && current <= last
        {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)
            .map_err(|e| file_read_error(&self.path.display().to_string(), e))?;
        let document = parse_document(&self.path, &content)?;
        let set = validate_document(document, mtime);

        info!(
            path = %self.path.display(),
            rules = set.rules.len(),
            "Loaded rule document"
        );
        self.initialized = true;
        self.last_reload = mtime;
        Ok(Some(set))
    }
}

/// Parse the raw document by extension: YAML for `.yaml`/`.yml`, JSON
/// otherwise.
fn parse_document(path: &Path, content: &str) -> AppResult<RuleDocument> {
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    if is_yaml {
        serde_yaml::from_str(content)
            .map_err(|e| rules_parse_error(&path.display().to_string(), e.to_string()))
    } else {
        serde_json::from_str(content)
            .map_err(|e| rules_parse_error(&path.display().to_string(), e.to_string()))
    }
}

/// Apply per-rule validation, keeping valid rules and logging the rest.
fn validate_document(document: RuleDocument, mtime: Option<SystemTime>) -> RuleSet {
    let mut seen: HashSet<CompactString> = HashSet::new();
    let mut rules = Vec::with_capacity(document.rules.len());
    for mut rule in document.rules {
        match validate_rule(&rule, &mut seen) {
            Ok(()) => {
                drop_bad_patterns(&mut rule);
                rules.push(rule);
            }
            Err(reason) => {
                warn!(rule_id = %rule.id, %reason, "Skipping invalid rule");
            }
        }
    }

    let mut whitelist = builtin_whitelist();
    whitelist.extend(
        document
            .config
            .whitelist
            .iter()
            .map(|w| CompactString::from(w.trim().to_lowercase()))
    );

    RuleSet {
        rules,
        min_word_length_for_fuzzy: document
            .config
            .min_word_length_for_fuzzy
            .unwrap_or(DEFAULT_MIN_WORD_LENGTH_FOR_FUZZY),
        whitelist,
        mtime
    }
}

fn validate_rule(rule: &Rule, seen: &mut HashSet<CompactString>) -> Result<(), String> {
    if rule.id.is_empty() {
        return Err("missing id".to_string());
    }
    if !seen.insert(rule.id.clone()) {
        return Err(format!("duplicate id '{}'", rule.id));
    }
    if !(0.0..=1.0).contains(&rule.threshold) {
        return Err(format!("threshold {} outside [0, 1]", rule.threshold));
    }
    if let Some(examples) = &rule.examples
        && examples.is_empty()
    {
        return Err("examples present but empty".to_string());
    }
    Ok(())
}

/// Remove patterns that do not compile, keeping the rest of the rule.
fn drop_bad_patterns(rule: &mut Rule) {
    let rule_id = rule.id.clone();
    let Some(patterns) = &mut rule.patterns else {
        return;
    };
    patterns.retain(|pattern| {
        match RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(_) => true,
            Err(e) => {
                let error = pattern_compile_error(&rule_id, &e);
                error!(%pattern, %error, "Skipping pattern that does not compile");
                false
            }
        }
    });
}
