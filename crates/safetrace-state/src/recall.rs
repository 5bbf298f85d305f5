//! # Recall State Machine
//!
//! ```text
//! draft ──approve──▶ draft ──activate──▶ active ──▶ complete
//!   │                                      │
//!   └──────────────▶ cancelled ◀───────────┘
//! ```
//!
//! | From   | To        | Guard / effect                                              |
//! |--------|-----------|-------------------------------------------------------------|
//! | draft  | active    | approved, approval time ≤ activation time, affected > 0     |
//! | draft  | cancelled | none                                                        |
//! | active | cancelled | none; recalled quantity retained                            |
//! | active | complete  | operator action or progress signal; sets completion time    |
//!
//! `complete` and `cancelled` are terminal. Approval and the affected
//! quantity can only be set while in draft, and process events are only
//! accepted while active.

use safetrace_core::{
    AlertCode, AlertLevel, RecallCode, RecallStatus, StateError, Timestamp, TraceabilityCode,
    ValidationError,
};
use serde::{Deserialize, Serialize};

use crate::process::RecallProcess;
use crate::progress::{progress_percent, ProgressState, ProgressUpdate};
use crate::record::TransitionRecord;

/// Whether a person or the system started a recall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    /// A human operator.
    #[default]
    Operator,
    /// Automated escalation.
    Automated,
}

/// Who started a recall.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Initiator {
    /// Initiator identity.
    pub initiator_id: String,
    /// Display name.
    pub initiator_name: String,
    /// Contact details.
    #[serde(default)]
    pub initiator_contact: String,
    /// Operator or automated.
    #[serde(default)]
    pub initiator_kind: ActorKind,
}

impl Initiator {
    /// A human operator.
    pub fn operator(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            initiator_id: id.into(),
            initiator_name: name.into(),
            initiator_contact: String::new(),
            initiator_kind: ActorKind::Operator,
        }
    }

    /// The system itself.
    pub fn automated(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            initiator_kind: ActorKind::Automated,
            ..Self::operator(id, name)
        }
    }
}

/// Everything needed to open a recall except its code.
#[derive(Debug, Clone, PartialEq)]
pub struct RecallDraft {
    /// Originating alert.
    pub alert_code: Option<AlertCode>,
    /// Traced item.
    pub traceability_code: TraceabilityCode,
    /// Product name.
    pub product_name: String,
    /// Affected batch.
    pub batch_number: Option<String>,
    /// Reason.
    pub recall_reason: String,
    /// Severity.
    pub recall_level: AlertLevel,
    /// Geographic or distribution scope.
    pub recall_scope: String,
    /// Instructions for handlers and consumers.
    pub recall_instructions: String,
    /// Public announcement text.
    pub public_notice: Option<String>,
    /// Items to recall; 0 when not yet known.
    pub affected_quantity: u64,
    /// Initiator.
    pub initiator: Initiator,
}

/// A product recall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecall {
    /// Unique recall code.
    pub recall_code: RecallCode,
    /// Originating alert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_code: Option<AlertCode>,
    /// Traced item.
    pub traceability_code: TraceabilityCode,
    /// Product name.
    pub product_name: String,
    /// Affected batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_number: Option<String>,
    /// Reason.
    pub recall_reason: String,
    /// Severity.
    pub recall_level: AlertLevel,
    /// Scope.
    pub recall_scope: String,
    /// Instructions.
    pub recall_instructions: String,
    /// Public announcement text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_notice: Option<String>,
    /// Initiator.
    #[serde(flatten)]
    pub initiator: Initiator,
    /// Lifecycle state.
    pub status: RecallStatus,
    /// Approver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    /// Approval time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_time: Option<Timestamp>,
    /// Approval comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_comment: Option<String>,
    /// Activation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_time: Option<Timestamp>,
    /// Completion time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<Timestamp>,
    /// Items to recall.
    pub affected_quantity: u64,
    /// Items recalled so far.
    pub recalled_quantity: u64,
    /// Percentage recalled.
    pub recall_progress: f64,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last change.
    pub updated_at: Timestamp,
    /// Accepted transitions.
    #[serde(default)]
    pub transition_log: Vec<TransitionRecord<RecallStatus>>,
}

impl ProductRecall {
    /// Open a recall in `draft`.
    ///
    /// # Errors
    ///
    /// A `Validation` error when an automated initiator gives no alert code.
    pub fn draft(
        recall_code: RecallCode,
        draft: RecallDraft,
        now: Timestamp,
    ) -> Result<Self, StateError> {
        if draft.initiator.initiator_kind == ActorKind::Automated && draft.alert_code.is_none() {
            return Err(ValidationError::new(
                "alert_code",
                "recalls started by automated detection must reference an alert",
            )
            .into());
        }
        Ok(Self {
            recall_code,
            alert_code: draft.alert_code,
            traceability_code: draft.traceability_code,
            product_name: draft.product_name,
            batch_number: draft.batch_number,
            recall_reason: draft.recall_reason,
            recall_level: draft.recall_level,
            recall_scope: draft.recall_scope,
            recall_instructions: draft.recall_instructions,
            public_notice: draft.public_notice,
            initiator: draft.initiator,
            status: RecallStatus::Draft,
            approved_by: None,
            approval_time: None,
            approval_comment: None,
            effective_time: None,
            completion_time: None,
            affected_quantity: draft.affected_quantity,
            recalled_quantity: 0,
            recall_progress: progress_percent(0, draft.affected_quantity),
            created_at: now,
            updated_at: now,
            transition_log: Vec::new(),
        })
    }

    /// Quantities driving progress.
    pub fn progress_state(&self) -> ProgressState {
        ProgressState {
            affected_quantity: self.affected_quantity,
            recalled_quantity: self.recalled_quantity,
        }
    }

    /// Whether an approval has been recorded.
    pub fn is_approved(&self) -> bool {
        self.approved_by.is_some() && self.approval_time.is_some()
    }

    /// Record approval. Draft only, once.
    pub fn approve(
        &mut self,
        approver: &str,
        comment: Option<&str>,
        at: Timestamp,
    ) -> Result<(), StateError> {
        self.require_draft("approve")?;
        if self.is_approved() {
            return Err(self.invalid_state("approve; already approved"));
        }
        let approver = approver.trim();
        if approver.is_empty() {
            return Err(ValidationError::missing("approved_by").into());
        }
        self.approved_by = Some(approver.to_string());
        self.approval_time = Some(at);
        self.approval_comment = comment
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        self.updated_at = at;
        Ok(())
    }

    /// Set the quantity to recall. Draft only; fixed once non-zero.
    pub fn set_affected_quantity(
        &mut self,
        quantity: u64,
        now: Timestamp,
    ) -> Result<(), StateError> {
        self.require_draft("set the affected quantity")?;
        if self.affected_quantity != 0 && self.affected_quantity != quantity {
            return Err(self.invalid_state(&format!(
                "change the affected quantity; already set to {}",
                self.affected_quantity
            )));
        }
        self.affected_quantity = quantity;
        self.recall_progress = progress_percent(self.recalled_quantity, quantity);
        self.updated_at = now;
        Ok(())
    }

    /// draft → active.
    pub fn activate(&mut self, now: Timestamp) -> Result<(), StateError> {
        self.require_transition(RecallStatus::Active)?;
        if self.approved_by.is_none() {
            return Err(ValidationError::new("approved_by", "recall has not been approved").into());
        }
        match self.approval_time {
            None => return Err(ValidationError::missing("approval_time").into()),
            Some(approved) if approved > now => {
                return Err(ValidationError::new(
                    "approval_time",
                    format!("approval at {approved} is after activation at {now}"),
                )
                .into());
            }
            Some(_) => {}
        }
        if self.affected_quantity == 0 {
            return Err(
                ValidationError::new("affected_quantity", "must be greater than zero").into(),
            );
        }
        self.effective_time = Some(now);
        self.apply(RecallStatus::Active, None, now);
        Ok(())
    }

    /// draft/active → cancelled.
    pub fn cancel(&mut self, reason: Option<&str>, now: Timestamp) -> Result<(), StateError> {
        self.require_transition(RecallStatus::Cancelled)?;
        let note = reason.map(str::trim).filter(|r| !r.is_empty()).map(str::to_string);
        self.apply(RecallStatus::Cancelled, note, now);
        Ok(())
    }

    /// active → complete.
    pub fn complete(&mut self, note: Option<&str>, now: Timestamp) -> Result<(), StateError> {
        self.require_transition(RecallStatus::Complete)?;
        self.completion_time = Some(now);
        self.apply(RecallStatus::Complete, note.map(str::to_string), now);
        Ok(())
    }

    /// Count a process event towards progress. Active only.
    ///
    /// Completion is signalled on the returned update; acting on it is the
    /// caller's decision.
    pub fn accept_process(
        &mut self,
        process: &RecallProcess,
        now: Timestamp,
    ) -> Result<ProgressUpdate, StateError> {
        if self.status != RecallStatus::Active {
            return Err(self.invalid_state("record a process"));
        }
        if process.recall_code != self.recall_code {
            return Err(ValidationError::new(
                "recall_code",
                format!("process belongs to {}, not {}", process.recall_code, self.recall_code),
            )
            .into());
        }
        let mut state = self.progress_state();
        let update = state.apply(process.processed_quantity);
        if let Some(exceeded) = update.capacity_exceeded {
            tracing::warn!(
                recall_code = %self.recall_code,
                reported = exceeded.reported,
                excess = exceeded.excess,
                "processed quantity exceeds remaining recall quantity"
            );
        }
        self.recalled_quantity = state.recalled_quantity;
        self.recall_progress = update.recall_progress;
        self.updated_at = now;
        Ok(update)
    }

    fn require_draft(&self, operation: &str) -> Result<(), StateError> {
        if self.status == RecallStatus::Draft {
            Ok(())
        } else {
            Err(self.invalid_state(operation))
        }
    }

    fn require_transition(&self, to: RecallStatus) -> Result<(), StateError> {
        if self.status.can_transition_to(to) {
            return Ok(());
        }
        Err(StateError::InvalidTransition {
            entity: "recall",
            code: self.recall_code.to_string(),
            from: self.status.as_str().to_string(),
            to: to.as_str().to_string(),
        })
    }

    fn invalid_state(&self, operation: &str) -> StateError {
        StateError::InvalidState {
            entity: "recall",
            code: self.recall_code.to_string(),
            state: self.status.as_str().to_string(),
            operation: operation.to_string(),
        }
    }

    fn apply(&mut self, to: RecallStatus, note: Option<String>, now: Timestamp) {
        tracing::debug!(
            recall_code = %self.recall_code,
            from = %self.status,
            to = %to,
            "recall transition"
        );
        self.transition_log.push(TransitionRecord {
            from_state: self.status,
            to_state: to,
            timestamp: now,
            note,
        });
        self.status = to;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    fn draft(affected: u64) -> ProductRecall {
        ProductRecall::draft(
            RecallCode::new("RCL-20240601-000001").unwrap(),
            RecallDraft {
                alert_code: Some(AlertCode::new("ALT-1").unwrap()),
                traceability_code: TraceabilityCode::new("TRC-9").unwrap(),
                product_name: "Oat milk".into(),
                batch_number: Some("B-2024-17".into()),
                recall_reason: "Listeria".into(),
                recall_level: AlertLevel::Critical,
                recall_scope: "North Island".into(),
                recall_instructions: "Return to store".into(),
                public_notice: None,
                affected_quantity: affected,
                initiator: Initiator::operator("u-1", "Safety Officer"),
            },
            ts("2024-06-01T08:00:00Z"),
        )
        .unwrap()
    }

    fn process(recall: &ProductRecall, qty: u64) -> RecallProcess {
        RecallProcess {
            recall_code: recall.recall_code.clone(),
            process_type: "retrieval".into(),
            description: String::new(),
            processed_by: "u-2".into(),
            processed_by_name: "Warehouse".into(),
            processed_quantity: qty,
            process_time: ts("2024-06-02T08:00:00Z"),
            location: "Auckland DC".into(),
            evidence_images: Vec::new(),
        }
    }

    fn active(affected: u64) -> ProductRecall {
        let mut r = draft(affected);
        r.approve("director", Some("go"), ts("2024-06-01T09:00:00Z")).unwrap();
        r.activate(ts("2024-06-01T10:00:00Z")).unwrap();
        r
    }

    #[test]
    fn activation_without_approval_is_rejected() {
        let mut r = draft(100);
        let before = r.clone();
        let err = r.activate(ts("2024-06-01T10:00:00Z")).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(r, before);
        assert_eq!(r.status, RecallStatus::Draft);
    }

    #[test]
    fn activation_requires_affected_quantity_and_ordered_approval() {
        let mut r = draft(0);
        r.approve("director", None, ts("2024-06-01T09:00:00Z")).unwrap();
        assert!(r.activate(ts("2024-06-01T10:00:00Z")).unwrap_err().is_validation());

        r.set_affected_quantity(500, ts("2024-06-01T09:30:00Z")).unwrap();
        assert!(r.activate(ts("2024-06-01T08:59:59Z")).unwrap_err().is_validation());

        r.activate(ts("2024-06-01T10:00:00Z")).unwrap();
        assert_eq!(r.status, RecallStatus::Active);
        assert_eq!(r.effective_time, Some(ts("2024-06-01T10:00:00Z")));
    }

    #[test]
    fn approval_is_draft_only_and_once() {
        let mut r = draft(10);
        r.approve("director", None, ts("2024-06-01T09:00:00Z")).unwrap();
        let err = r.approve("other", None, ts("2024-06-01T09:05:00Z")).unwrap_err();
        assert!(err.is_invalid_state());
        assert_eq!(r.approved_by.as_deref(), Some("director"));

        let mut r = active(10);
        assert!(r.approve("x", None, ts("2024-06-02T00:00:00Z")).unwrap_err().is_invalid_state());
        let err = r.set_affected_quantity(20, ts("2024-06-02T00:00:00Z")).unwrap_err();
        assert!(err.is_invalid_state());
    }

    #[test]
    fn affected_quantity_is_fixed_once_set() {
        let mut r = draft(100);
        let now = ts("2024-06-01T09:00:00Z");
        assert!(r.set_affected_quantity(120, now).unwrap_err().is_invalid_state());
        r.set_affected_quantity(100, now).unwrap();
        assert_eq!(r.affected_quantity, 100);
    }

    #[test]
    fn automated_recall_needs_alert_code() {
        let mut d = RecallDraft {
            alert_code: None,
            traceability_code: TraceabilityCode::new("TRC-1").unwrap(),
            product_name: "Eggs".into(),
            batch_number: None,
            recall_reason: "Salmonella".into(),
            recall_level: AlertLevel::High,
            recall_scope: "National".into(),
            recall_instructions: "Destroy".into(),
            public_notice: None,
            affected_quantity: 0,
            initiator: Initiator::automated("system", "detector"),
        };
        let code = RecallCode::new("RCL-1").unwrap();
        let now = ts("2024-06-01T08:00:00Z");
        let err = ProductRecall::draft(code.clone(), d.clone(), now).unwrap_err();
        assert!(matches!(err, StateError::Validation(ref v) if v.field == "alert_code"));

        d.initiator = Initiator::operator("u-1", "Officer");
        assert!(ProductRecall::draft(code, d, now).is_ok());
    }

    #[test]
    fn processes_only_while_active() {
        let mut r = draft(100);
        let p = process(&r, 10);
        assert!(r.accept_process(&p, ts("2024-06-02T00:00:00Z")).unwrap_err().is_invalid_state());

        let mut r = active(100);
        let update = r.accept_process(&p, ts("2024-06-02T00:00:00Z")).unwrap();
        assert_eq!(update.recalled_quantity, 10);
        assert_eq!(r.recall_progress, 10.0);

        r.cancel(Some("supplier error"), ts("2024-06-03T00:00:00Z")).unwrap();
        assert_eq!(r.recalled_quantity, 10);
        assert!(r.accept_process(&p, ts("2024-06-04T00:00:00Z")).unwrap_err().is_invalid_state());
    }

    #[test]
    fn progress_signals_completion() {
        let mut r = active(100);
        let now = ts("2024-06-02T00:00:00Z");
        assert!(!r.accept_process(&process(&r, 40), now).unwrap().completed);
        let update = r.accept_process(&process(&r, 70), now).unwrap();
        assert!(update.completed);
        assert_eq!(r.recalled_quantity, 100);
        assert_eq!(r.recall_progress, 100.0);

        r.complete(Some("progress reached 100%"), now).unwrap();
        assert_eq!(r.status, RecallStatus::Complete);
        assert_eq!(r.completion_time, Some(now));
    }

    #[test]
    fn terminal_states_reject_everything() {
        let now = ts("2024-06-05T00:00:00Z");
        let mut r = active(5);
        r.complete(None, now).unwrap();
        for target in RecallStatus::all() {
            let before = r.clone();
            let result = match target {
                RecallStatus::Draft => Err(r.require_transition(RecallStatus::Draft).unwrap_err()),
                RecallStatus::Active => r.activate(now),
                RecallStatus::Complete => r.complete(None, now),
                RecallStatus::Cancelled => r.cancel(None, now),
            };
            assert!(result.unwrap_err().is_invalid_transition());
            assert_eq!(r, before);
        }
    }

    #[test]
    fn stored_progress_follows_quantities_in_draft() {
        let mut r = draft(0);
        assert_eq!(r.recall_progress, 100.0);
        assert_eq!(r.recall_progress, r.progress_state().progress());

        r.set_affected_quantity(250, ts("2024-06-01T09:00:00Z")).unwrap();
        assert_eq!(r.recall_progress, 0.0);
        assert_eq!(r.recall_progress, progress_percent(r.recalled_quantity, r.affected_quantity));

        let r = draft(40);
        assert_eq!(r.recall_progress, 0.0);
    }

    fn in_state(status: RecallStatus) -> ProductRecall {
        let now = ts("2024-06-05T00:00:00Z");
        match status {
            RecallStatus::Draft => {
                let mut r = draft(10);
                r.approve("director", None, ts("2024-06-01T09:00:00Z")).unwrap();
                r
            }
            RecallStatus::Active => active(10),
            RecallStatus::Complete => {
                let mut r = active(10);
                r.complete(None, now).unwrap();
                r
            }
            RecallStatus::Cancelled => {
                let mut r = active(10);
                r.cancel(None, now).unwrap();
                r
            }
        }
    }

    fn attempt(r: &mut ProductRecall, to: RecallStatus, now: Timestamp) -> Result<(), StateError> {
        match to {
            RecallStatus::Draft => r.require_transition(RecallStatus::Draft),
            RecallStatus::Active => r.activate(now),
            RecallStatus::Complete => r.complete(None, now),
            RecallStatus::Cancelled => r.cancel(None, now),
        }
    }

    #[test]
    fn every_pair_outside_table_is_rejected() {
        let now = ts("2024-06-06T00:00:00Z");
        for from in RecallStatus::all() {
            for to in RecallStatus::all() {
                if from.can_transition_to(*to) {
                    continue;
                }
                let mut r = in_state(*from);
                assert_eq!(r.status, *from);
                let before = r.clone();
                let err = attempt(&mut r, *to, now).unwrap_err();
                assert!(err.is_invalid_transition(), "{from} -> {to}: {err}");
                assert_eq!(r, before);
            }
        }
    }

    #[test]
    fn draft_cannot_complete_even_when_approved() {
        let mut r = in_state(RecallStatus::Draft);
        let before = r.clone();
        let err = r.complete(None, ts("2024-06-02T00:00:00Z")).unwrap_err();
        assert!(matches!(err, StateError::InvalidTransition { ref from, ref to, .. }
            if from == "draft" && to == "complete"));
        assert_eq!(r, before);
    }

    #[test]
    fn process_for_another_recall_is_rejected() {
        let mut r = active(10);
        let mut p = process(&r, 1);
        p.recall_code = RecallCode::new("RCL-OTHER").unwrap();
        assert!(r.accept_process(&p, ts("2024-06-02T00:00:00Z")).unwrap_err().is_validation());
        assert_eq!(r.recalled_quantity, 0);
    }
}
