//! Orchestrator errors.

use safetrace_core::{StateError, ValidationError};
use thiserror::Error;

use crate::config::ConfigError;

/// Error from an orchestrator operation.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Request validation failed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A lifecycle operation was rejected.
    #[error(transparent)]
    State(#[from] StateError),

    /// No record with that code.
    #[error("{entity} {code} not found")]
    NotFound {
        /// Entity kind.
        entity: &'static str,
        /// Requested code.
        code: String,
    },

    /// The code generator produced a code that is already registered.
    #[error("{entity} code {code} is already registered")]
    DuplicateCode {
        /// Entity kind.
        entity: &'static str,
        /// Generated code.
        code: String,
    },

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EngineError {
    pub(crate) fn not_found(entity: &'static str, code: impl ToString) -> Self {
        Self::NotFound {
            entity,
            code: code.to_string(),
        }
    }

    /// Whether this is a validation failure, at request or guard level.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::State(StateError::Validation(_)))
    }

    /// Whether this is a transition outside the table.
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::State(e) if e.is_invalid_transition())
    }

    /// Whether this is an operation attempted in the wrong state.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::State(e) if e.is_invalid_state())
    }

    /// Whether the record was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
