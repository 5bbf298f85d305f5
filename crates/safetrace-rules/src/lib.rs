//! # safetrace-rules: Rule Evaluation Engine
//!
//! Turns dynamically configured detection rules into alert proposals:
//!
//! - [`value`] narrows untrusted product payloads into [`ProductData`].
//! - [`condition`] parses trigger conditions into a typed [`Condition`] tree,
//!   once, at rule load.
//! - [`evaluator`] evaluates a tree against product data. Evaluation is total
//!   and, for a fixed evaluation time, deterministic.
//! - [`rule`] compiles [`RuleDefinition`]s into [`AlertRule`]s.
//! - [`catalog`] holds the enabled rules as an atomically swapped snapshot.
//! - [`detection`] runs a payload against the catalog and proposes alerts.
//!
//! Nothing here mutates alerts or recalls. Registration and lifecycle belong
//! to `safetrace-state` and `safetrace-engine`.

pub mod catalog;
pub mod condition;
pub mod detection;
pub mod error;
pub mod evaluator;
pub mod rule;
pub mod value;

pub use catalog::{ReloadReport, RuleCatalog, RuleSnapshot, SkippedRule};
pub use condition::{Comparison, Condition, Operand, Operator, MAX_CONDITION_DEPTH};
pub use detection::{
    DetectAnomalyRequest, DetectionReport, DetectionService, ProposedAlert, DEFAULT_SCOPE_FIELD,
};
pub use error::{ConditionError, RuleError};
pub use evaluator::{Evaluation, Evaluator, LeafTrace, MismatchReason};
pub use rule::{AlertRule, DetectionScope, RuleDefinition, RuleSet};
pub use value::{FieldValue, ProductData};
