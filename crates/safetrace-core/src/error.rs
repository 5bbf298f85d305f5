//! # Error Types
//!
//! Errors shared by every lifecycle crate. All errors use `thiserror`.
//!
//! - [`ValidationError`] names the offending field and why it was rejected.
//! - [`StateError`] carries the entity kind, its code, the current state and
//!   the attempted target or operation.

use thiserror::Error;

/// A missing or malformed input field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("validation failed for `{field}`: {reason}")]
pub struct ValidationError {
    /// Name of the rejected field.
    pub field: String,
    /// Why the value was rejected.
    pub reason: String,
}

impl ValidationError {
    /// Create a validation error for `field`.
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// A required field was absent or blank.
    pub fn missing(field: impl Into<String>) -> Self {
        Self::new(field, "required field is missing or blank")
    }
}

/// Reject empty or whitespace-only values for a required field.
pub fn require_non_blank(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::missing(field));
    }
    Ok(())
}

/// Error in a lifecycle state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The requested (state, target) pair is not in the transition table.
    #[error("invalid {entity} transition for {code}: {from} -> {to}")]
    InvalidTransition {
        /// Entity kind ("alert" or "recall").
        entity: &'static str,
        /// Code of the entity.
        code: String,
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// An operation was attempted outside the state that permits it.
    #[error("{entity} {code} is {state}; cannot {operation}")]
    InvalidState {
        /// Entity kind ("alert" or "recall").
        entity: &'static str,
        /// Code of the entity.
        code: String,
        /// Current state.
        state: String,
        /// The rejected operation.
        operation: String,
    },

    /// A transition guard failed on a missing or malformed field.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl StateError {
    /// Whether this error is a rejected transition-table lookup.
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }

    /// Whether this error is an operation attempted in the wrong state.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }

    /// Whether this error is a failed field validation.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
