//! Transition log entries shared by the alert and recall lifecycles.

use safetrace_core::Timestamp;
use serde::{Deserialize, Serialize};

/// One accepted state transition. Logs are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord<S> {
    /// State before the transition.
    pub from_state: S,
    /// State after the transition.
    pub to_state: S,
    /// When the transition was applied.
    pub timestamp: Timestamp,
    /// Who or what applied it, with any reason given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}
