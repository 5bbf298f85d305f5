//! # Code Newtypes and Code Generation
//!
//! Every record in SafeTrace is addressed by a business code rather than a
//! database key. Each code kind is a distinct type, so a [`RecallCode`]
//! cannot be passed where an [`AlertCode`] is expected.
//!
//! ## Validation
//!
//! Codes are trimmed and must be non-blank, at most 64 characters, and free of
//! whitespace and control characters. Deserialization routes through the same
//! constructor, so an invalid code in a payload is rejected rather than carried.
//!
//! ## Generation
//!
//! Uniqueness of alert and recall codes is owned by the core through the
//! [`CodeGenerator`] trait. [`SequenceCodeGenerator`] produces
//! `PREFIX-YYYYMMDD-NNNNNN` and is deterministic for a fixed clock, which is
//! what tests use. [`UuidCodeGenerator`] produces `PREFIX-<32 hex>` and needs
//! no coordination between processes.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::temporal::Timestamp;

/// Longest accepted code.
pub const MAX_CODE_LEN: usize = 64;

/// Deserialize a code as a plain `String`, then validate it through `new()`.
macro_rules! impl_validating_deserialize {
    ($ty:ident) => {
        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                Self::new(raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

/// Shared constructor, accessor and `Display` for string codes.
macro_rules! impl_code {
    ($ty:ident, $field:literal) => {
        impl $ty {
            /// Validate and wrap a code.
            pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
                validate_code($field, raw.into()).map(Self)
            }

            /// The code as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $ty {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl_validating_deserialize!($ty);
    };
}

fn validate_code(field: &str, raw: String) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::missing(field));
    }
    if trimmed.len() > MAX_CODE_LEN {
        return Err(ValidationError::new(
            field,
            format!("longer than {MAX_CODE_LEN} characters"),
        ));
    }
    if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::new(
            field,
            "must not contain whitespace or control characters",
        ));
    }
    Ok(trimmed.to_string())
}

/// Unique code of an alert.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AlertCode(String);
impl_code!(AlertCode, "alert_code");

/// Unique code of a product recall.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RecallCode(String);
impl_code!(RecallCode, "recall_code");

/// Unique code of a detection rule. Ordering is plain string ordering, which
/// fixes the candidate order during detection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RuleCode(String);
impl_code!(RuleCode, "rule_code");

/// Traceability code of a traced product item. Many alerts may share one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TraceabilityCode(String);
impl_code!(TraceabilityCode, "traceability_code");

// ─── Code Generation ─────────────────────────────────────────────────

/// Produces fresh, unique alert and recall codes.
pub trait CodeGenerator: Send + Sync {
    /// Next alert code, issued at `at`.
    fn next_alert_code(&self, at: Timestamp) -> AlertCode;

    /// Next recall code, issued at `at`.
    fn next_recall_code(&self, at: Timestamp) -> RecallCode;
}

/// Sequential `PREFIX-YYYYMMDD-NNNNNN` codes.
///
/// Sequences are per kind and never reset within a process; uniqueness
/// across processes requires distinct prefixes.
#[derive(Debug)]
pub struct SequenceCodeGenerator {
    alert_prefix: String,
    recall_prefix: String,
    alert_seq: AtomicU64,
    recall_seq: AtomicU64,
}

impl SequenceCodeGenerator {
    /// Generator with the given prefixes, starting both sequences at 1.
    pub fn new(alert_prefix: impl Into<String>, recall_prefix: impl Into<String>) -> Self {
        Self {
            alert_prefix: alert_prefix.into(),
            recall_prefix: recall_prefix.into(),
            alert_seq: AtomicU64::new(1),
            recall_seq: AtomicU64::new(1),
        }
    }

    /// Continue numbering after previously issued codes.
    pub fn starting_at(self, next_alert: u64, next_recall: u64) -> Self {
        self.alert_seq.store(next_alert, Ordering::SeqCst);
        self.recall_seq.store(next_recall, Ordering::SeqCst);
        self
    }

    fn format(prefix: &str, at: Timestamp, seq: u64) -> String {
        format!("{prefix}-{}-{seq:06}", at.compact_date())
    }
}

impl Default for SequenceCodeGenerator {
    fn default() -> Self {
        Self::new("ALT", "RCL")
    }
}

impl CodeGenerator for SequenceCodeGenerator {
    fn next_alert_code(&self, at: Timestamp) -> AlertCode {
        let seq = self.alert_seq.fetch_add(1, Ordering::SeqCst);
        AlertCode(Self::format(&self.alert_prefix, at, seq))
    }

    fn next_recall_code(&self, at: Timestamp) -> RecallCode {
        let seq = self.recall_seq.fetch_add(1, Ordering::SeqCst);
        RecallCode(Self::format(&self.recall_prefix, at, seq))
    }
}

/// Random `PREFIX-<uuid simple>` codes.
#[derive(Debug, Clone)]
pub struct UuidCodeGenerator {
    alert_prefix: String,
    recall_prefix: String,
}

impl UuidCodeGenerator {
    /// Generator with the given prefixes.
    pub fn new(alert_prefix: impl Into<String>, recall_prefix: impl Into<String>) -> Self {
        Self {
            alert_prefix: alert_prefix.into(),
            recall_prefix: recall_prefix.into(),
        }
    }
}

impl CodeGenerator for UuidCodeGenerator {
    fn next_alert_code(&self, _at: Timestamp) -> AlertCode {
        AlertCode(format!("{}-{}", self.alert_prefix, Uuid::new_v4().simple()))
    }

    fn next_recall_code(&self, _at: Timestamp) -> RecallCode {
        RecallCode(format!("{}-{}", self.recall_prefix, Uuid::new_v4().simple()))
    }
}
