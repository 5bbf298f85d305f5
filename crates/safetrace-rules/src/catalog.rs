//! # Rule Catalog
//!
//! The active rule set is an immutable [`RuleSnapshot`] behind a single
//! `Arc`. Readers clone the `Arc` and work on that snapshot for as long as
//! they need it; [`RuleCatalog::reload`] builds a complete new snapshot and
//! swaps the pointer under a write lock. A reader therefore sees either the
//! old rule set or the new one, never a mix.
//!
//! ## Indexing
//!
//! Enabled rules are indexed by detection scope: global rules in one list,
//! scoped rules under each normalised category. Both lists hold rule codes,
//! and candidate lookup merges them in rule-code order.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::RwLock;
use safetrace_core::RuleCode;
use serde::{Deserialize, Serialize};

use crate::rule::{normalize_category, AlertRule, DetectionScope, RuleDefinition};

/// A rule that could not be loaded or evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRule {
    /// Rule code as authored (may be blank).
    pub rule_code: String,
    /// Why it was skipped.
    pub reason: String,
}

/// Outcome of a catalog reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadReport {
    /// Version of the snapshot now active.
    pub version: u64,
    /// Number of enabled rules loaded.
    pub loaded: usize,
    /// Codes of disabled rules.
    pub disabled: Vec<String>,
    /// Rules rejected at load.
    pub skipped: Vec<SkippedRule>,
}

/// Immutable, indexed set of enabled rules.
#[derive(Debug, Default)]
pub struct RuleSnapshot {
    version: u64,
    rules: BTreeMap<RuleCode, Arc<AlertRule>>,
    global: BTreeSet<RuleCode>,
    by_category: BTreeMap<String, BTreeSet<RuleCode>>,
    disabled: BTreeSet<String>,
    skipped: BTreeMap<String, String>,
}

impl RuleSnapshot {
    /// Snapshot version; 0 for the empty initial snapshot.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of enabled rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rule is enabled.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// An enabled rule by code.
    pub fn get(&self, code: &str) -> Option<&Arc<AlertRule>> {
        let code = RuleCode::new(code).ok()?;
        self.rules.get(&code)
    }

    /// All enabled rules in code order.
    pub fn rules(&self) -> impl Iterator<Item = &Arc<AlertRule>> {
        self.rules.values()
    }

    /// Global rules plus rules scoped to `scope`, ordered by rule code.
    /// With no scope only global rules apply.
    pub fn candidates(&self, scope: Option<&str>) -> Vec<Arc<AlertRule>> {
        let mut codes: BTreeSet<&RuleCode> = self.global.iter().collect();
        if let Some(category) = scope.map(normalize_category).filter(|c| !c.is_empty()) {
            if let Some(scoped) = self.by_category.get(&category) {
                codes.extend(scoped.iter());
            }
        }
        codes
            .into_iter()
            .filter_map(|code| self.rules.get(code).cloned())
            .collect()
    }

    /// Whether `code` names a rule that was loaded disabled.
    pub fn is_disabled(&self, code: &str) -> bool {
        self.disabled.contains(code.trim())
    }

    /// Why `code` was rejected at load, if it was.
    pub fn skip_reason(&self, code: &str) -> Option<&str> {
        self.skipped.get(code.trim()).map(String::as_str)
    }

    fn build(version: u64, definitions: &[RuleDefinition]) -> (Self, ReloadReport) {
        let mut snapshot = Self {
            version,
            ..Self::default()
        };
        let mut skipped = Vec::new();
        let mut seen = BTreeSet::new();

        for def in definitions {
            let raw_code = def.rule_code.trim().to_string();
            if !raw_code.is_empty() && !seen.insert(raw_code.clone()) {
                tracing::warn!(rule_code = %raw_code, "skipping duplicate rule code");
                skipped.push(SkippedRule {
                    rule_code: raw_code,
                    reason: "duplicate rule code".to_string(),
                });
                continue;
            }
            if !def.is_enabled {
                snapshot.disabled.insert(raw_code);
                continue;
            }
            match AlertRule::compile(def) {
                Ok(rule) => snapshot.insert(rule),
                Err(e) => {
                    tracing::warn!(rule_code = %raw_code, reason = %e, "skipping rule");
                    snapshot.skipped.insert(raw_code.clone(), e.to_string());
                    skipped.push(SkippedRule {
                        rule_code: raw_code,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let report = ReloadReport {
            version,
            loaded: snapshot.rules.len(),
            disabled: snapshot.disabled.iter().cloned().collect(),
            skipped,
        };
        (snapshot, report)
    }

    fn insert(&mut self, rule: AlertRule) {
        match &rule.scope {
            DetectionScope::Global => {
                self.global.insert(rule.code.clone());
            }
            DetectionScope::Categories(cats) => {
                for cat in cats {
                    self.by_category
                        .entry(cat.clone())
                        .or_default()
                        .insert(rule.code.clone());
                }
            }
        }
        self.rules.insert(rule.code.clone(), Arc::new(rule));
    }
}

/// Hot-swappable holder of the active [`RuleSnapshot`].
#[derive(Debug)]
pub struct RuleCatalog {
    current: RwLock<Arc<RuleSnapshot>>,
}

impl RuleCatalog {
    /// An empty catalog at version 0.
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(RuleSnapshot::default())),
        }
    }

    /// A catalog loaded from `definitions`, plus the load report.
    pub fn from_definitions(definitions: &[RuleDefinition]) -> (Self, ReloadReport) {
        let catalog = Self::new();
        let report = catalog.reload(definitions);
        (catalog, report)
    }

    /// The active snapshot.
    pub fn snapshot(&self) -> Arc<RuleSnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Version of the active snapshot.
    pub fn version(&self) -> u64 {
        self.current.read().version
    }

    /// Number of enabled rules in the active snapshot.
    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    /// Whether the active snapshot has no enabled rules.
    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }

    /// An enabled rule by code, from the active snapshot.
    pub fn get(&self, code: &str) -> Option<Arc<AlertRule>> {
        self.snapshot().get(code).cloned()
    }

    /// Candidate rules for `scope` from the active snapshot.
    pub fn candidates(&self, scope: Option<&str>) -> Vec<Arc<AlertRule>> {
        self.snapshot().candidates(scope)
    }

    /// Compile `definitions` into a new snapshot and make it active.
    ///
    /// The write lock is held across the rebuild, so concurrent reloads
    /// apply one after another with increasing versions.
    pub fn reload(&self, definitions: &[RuleDefinition]) -> ReloadReport {
        let mut guard = self.current.write();
        let version = guard.version + 1;
        let (snapshot, report) = RuleSnapshot::build(version, definitions);
        *guard = Arc::new(snapshot);
        drop(guard);

        tracing::info!(
            version = report.version,
            loaded = report.loaded,
            disabled = report.disabled.len(),
            skipped = report.skipped.len(),
            "rule catalog reloaded"
        );
        report
    }
}

impl Default for RuleCatalog {
    fn default() -> Self {
        Self::new()
    }
}
