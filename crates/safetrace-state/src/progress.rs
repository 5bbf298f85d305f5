//! # Recall Progress
//!
//! Folds processed quantities into the recalled quantity of a recall:
//!
//! ```text
//! recalled' = min(affected, recalled + processed)
//! progress  = 100                               if affected = 0
//!           = clamp(100 * recalled / affected)  otherwise
//! ```
//!
//! Events apply strictly in the order given. The tracker neither reorders
//! nor deduplicates: applying the same event twice counts it twice. All
//! arithmetic saturates.

use serde::{Deserialize, Serialize};

/// Quantities that determine recall progress.
///
/// Deserializes from a full recall record as well, since unknown fields are
/// ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgressState {
    /// Items to recall.
    #[serde(default)]
    pub affected_quantity: u64,
    /// Items recalled so far. Never exceeds `affected_quantity`.
    #[serde(default)]
    pub recalled_quantity: u64,
}

/// A processed quantity was partly discarded because the target was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityExceeded {
    /// Quantity the event reported.
    pub reported: u64,
    /// Quantity counted towards the recall.
    pub applied: u64,
    /// Quantity discarded.
    pub excess: u64,
}

/// Outcome of applying one event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Recalled quantity before the event.
    pub previous_quantity: u64,
    /// Recalled quantity after the event.
    pub recalled_quantity: u64,
    /// Target quantity.
    pub affected_quantity: u64,
    /// Progress percentage after the event.
    pub recall_progress: f64,
    /// The event brought the recall to its target.
    pub completed: bool,
    /// Set when part of the event was discarded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity_exceeded: Option<CapacityExceeded>,
}

/// Outcome of a replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayOutcome {
    /// State after the last applied event.
    pub state: ProgressState,
    /// Progress percentage of `state`.
    pub recall_progress: f64,
    /// Number of events applied.
    pub applied: usize,
    /// Whether replay stopped on a completion signal.
    pub completed: bool,
    /// One update per applied event.
    pub updates: Vec<ProgressUpdate>,
}

/// Progress percentage for the given quantities.
pub fn progress_percent(recalled: u64, affected: u64) -> f64 {
    if affected == 0 {
        return 100.0;
    }
    (recalled as f64 * 100.0 / affected as f64).clamp(0.0, 100.0)
}

impl ProgressState {
    /// State with nothing recalled yet.
    pub fn new(affected_quantity: u64) -> Self {
        Self {
            affected_quantity,
            recalled_quantity: 0,
        }
    }

    /// Current progress percentage.
    pub fn progress(&self) -> f64 {
        progress_percent(self.recalled_quantity, self.affected_quantity)
    }

    /// Whether the target has been reached.
    pub fn is_complete(&self) -> bool {
        self.recalled_quantity >= self.affected_quantity
    }

    /// Count `processed` items towards the target.
    pub fn apply(&mut self, processed: u64) -> ProgressUpdate {
        let previous = self.recalled_quantity;
        let uncapped = previous.saturating_add(processed);
        let recalled = uncapped.min(self.affected_quantity).max(previous);
        self.recalled_quantity = recalled;

        let applied = recalled - previous;
        let capacity_exceeded = (applied < processed).then(|| CapacityExceeded {
            reported: processed,
            applied,
            excess: processed - applied,
        });

        ProgressUpdate {
            previous_quantity: previous,
            recalled_quantity: recalled,
            affected_quantity: self.affected_quantity,
            recall_progress: self.progress(),
            completed: previous < self.affected_quantity && recalled == self.affected_quantity,
            capacity_exceeded,
        }
    }

    /// Fold `quantities` from this state, stopping at the first completion.
    pub fn replay<I>(mut self, quantities: I) -> ReplayOutcome
    where
        I: IntoIterator<Item = u64>,
    {
        let mut updates = Vec::new();
        let mut completed = false;
        for quantity in quantities {
            let update = self.apply(quantity);
            updates.push(update);
            if update.completed {
                completed = true;
                break;
            }
        }
        ReplayOutcome {
            state: self,
            recall_progress: self.progress(),
            applied: updates.len(),
            completed,
            updates,
        }
    }
}
