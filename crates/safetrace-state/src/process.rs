//! Recall process events.

use safetrace_core::{RecallCode, Timestamp};
use serde::{Deserialize, Serialize};

/// One unit of recall work: items retrieved, destroyed, returned and so on.
/// Immutable once appended to a recall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecallProcess {
    /// Recall the work belongs to.
    pub recall_code: RecallCode,
    /// Kind of work (`retrieval`, `destruction`, ...).
    pub process_type: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Handler identity.
    pub processed_by: String,
    /// Handler name.
    pub processed_by_name: String,
    /// Items handled.
    pub processed_quantity: u64,
    /// When the work was done.
    pub process_time: Timestamp,
    /// Where the work was done.
    pub location: String,
    /// Evidence image references.
    #[serde(default)]
    pub evidence_images: Vec<String>,
}
