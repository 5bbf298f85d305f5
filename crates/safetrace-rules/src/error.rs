//! # Rule Errors
//!
//! Errors raised while turning rule definitions into compiled rules. None of
//! these surface from detection itself: the catalog converts them into
//! [`SkippedRule`](crate::catalog::SkippedRule) entries at load time.

use safetrace_core::ValidationError;
use thiserror::Error;

/// A trigger condition could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConditionError {
    /// The condition text is not valid JSON.
    #[error("trigger condition is not valid JSON: {0}")]
    Json(String),

    /// A node has the wrong shape.
    #[error("malformed condition at {path}: {reason}")]
    Malformed {
        /// JSON path of the offending node (`$`, `$.and[1].not`, ...).
        path: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The tree is nested deeper than the evaluator accepts.
    #[error("condition nesting exceeds {max} levels at {path}")]
    TooDeep {
        /// JSON path where the limit was hit.
        path: String,
        /// The nesting limit.
        max: usize,
    },
}

impl ConditionError {
    pub(crate) fn malformed(path: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for ConditionError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

/// A rule definition could not be compiled.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    /// A required field is missing or has an unknown value.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The trigger condition is malformed.
    #[error(transparent)]
    Condition(#[from] ConditionError),
}
