//! # Alert State Machine
//!
//! ```text
//! pending ──▶ processing ──▶ resolved ──▶ closed
//!    ▲            │                         ▲
//!    └────────────┤                         │
//!                 └─────────────────────────┘
//! ```
//!
//! | From       | To         | Guard / effect                                   |
//! |------------|------------|--------------------------------------------------|
//! | pending    | processing | assignee given or already set; recorded          |
//! | processing | resolved   | handling measures and result; sets handling time |
//! | processing | pending    | clears the assignee                              |
//! | resolved   | closed     | none                                             |
//! | processing | closed     | closure reason, stored as the handling result    |
//!
//! The table in [`AlertStatus::valid_transitions`] is consulted first, so a
//! pair outside it fails with `InvalidTransition` before any guard runs. A
//! guard that fails on a missing field returns a `ValidationError` naming
//! the field. Either way the alert is left untouched.

use safetrace_core::{
    AlertCode, AlertLevel, AlertStatus, AlertType, RecallCode, RuleCode, StateError, Timestamp,
    TraceabilityCode, ValidationError,
};
use serde::{Deserialize, Serialize};

use crate::record::TransitionRecord;
use crate::requests::UpdateAlertStatusRequest;

/// Who reported an alert.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Reporter {
    /// Reporter identity.
    pub reporter_id: String,
    /// Display name.
    pub reporter_name: String,
    /// Contact details.
    #[serde(default)]
    pub reporter_contact: String,
}

impl Reporter {
    /// A reporter with no contact details.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            reporter_id: id.into(),
            reporter_name: name.into(),
            reporter_contact: String::new(),
        }
    }
}

/// How an alert came to exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertOrigin {
    /// Raised by automated detection.
    Detection {
        /// The rule that fired.
        rule_code: RuleCode,
    },
    /// Reported by a person.
    Manual,
}

/// Everything needed to raise an alert except its code.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertDraft {
    /// Traced item.
    pub traceability_code: TraceabilityCode,
    /// Product name.
    pub product_name: String,
    /// Alert type.
    pub alert_type: AlertType,
    /// Alert level.
    pub alert_level: AlertLevel,
    /// Title.
    pub title: String,
    /// Description.
    pub description: String,
    /// Evidence image references.
    pub evidence_images: Vec<String>,
    /// Reporter.
    pub reporter: Reporter,
    /// Origin.
    pub origin: AlertOrigin,
}

/// A product-safety alert. Alerts are never deleted, only closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Unique alert code.
    pub alert_code: AlertCode,
    /// Traced item.
    pub traceability_code: TraceabilityCode,
    /// Product name.
    pub product_name: String,
    /// Alert type.
    pub alert_type: AlertType,
    /// Alert level.
    pub alert_level: AlertLevel,
    /// Title.
    pub title: String,
    /// Description.
    pub description: String,
    /// Evidence image references.
    #[serde(default)]
    pub evidence_images: Vec<String>,
    /// Reporter.
    #[serde(flatten)]
    pub reporter: Reporter,
    /// Origin.
    pub origin: AlertOrigin,
    /// Lifecycle state.
    pub status: AlertStatus,
    /// Current handler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    /// Measures taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handling_measures: Option<String>,
    /// Outcome, or the closure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handling_result: Option<String>,
    /// When the alert was resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handling_time: Option<Timestamp>,
    /// Whether a recall was created from this alert.
    pub recall_initiated: bool,
    /// The linked recall.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recall_code: Option<RecallCode>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last change.
    pub updated_at: Timestamp,
    /// Accepted transitions.
    #[serde(default)]
    pub transition_log: Vec<TransitionRecord<AlertStatus>>,
}

impl Alert {
    /// Raise a new alert in `pending`.
    pub fn raise(alert_code: AlertCode, draft: AlertDraft, now: Timestamp) -> Self {
        Self {
            alert_code,
            traceability_code: draft.traceability_code,
            product_name: draft.product_name,
            alert_type: draft.alert_type,
            alert_level: draft.alert_level,
            title: draft.title,
            description: draft.description,
            evidence_images: draft.evidence_images,
            reporter: draft.reporter,
            origin: draft.origin,
            status: AlertStatus::Pending,
            assigned_to: None,
            handling_measures: None,
            handling_result: None,
            handling_time: None,
            recall_initiated: false,
            recall_code: None,
            created_at: now,
            updated_at: now,
            transition_log: Vec::new(),
        }
    }

    /// The rule that raised this alert, if any.
    pub fn rule_code(&self) -> Option<&RuleCode> {
        match &self.origin {
            AlertOrigin::Detection { rule_code } => Some(rule_code),
            AlertOrigin::Manual => None,
        }
    }

    /// Whether `recall_initiated` and `recall_code` agree.
    pub fn recall_link_consistent(&self) -> bool {
        self.recall_initiated == self.recall_code.is_some()
    }

    /// Apply a status update request.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` for a pair outside the table, `Validation` for a
    /// failed guard.
    pub fn apply_update(
        &mut self,
        update: &UpdateAlertStatusRequest,
        now: Timestamp,
    ) -> Result<(), StateError> {
        match update.status {
            AlertStatus::Processing => self.start_processing(update.assigned_to.as_deref(), now),
            AlertStatus::Resolved => self.resolve(
                update.handling_measures.as_deref().unwrap_or_default(),
                update.handling_result.as_deref().unwrap_or_default(),
                now,
            ),
            AlertStatus::Pending => self.return_to_pending(now),
            AlertStatus::Closed => self.close(update.handling_result.as_deref(), now),
        }
    }

    /// pending → processing.
    pub fn start_processing(
        &mut self,
        assignee: Option<&str>,
        now: Timestamp,
    ) -> Result<(), StateError> {
        self.require_transition(AlertStatus::Processing)?;
        let assignee = non_blank(assignee)
            .or_else(|| non_blank(self.assigned_to.as_deref()))
            .map(str::to_string)
            .ok_or_else(|| ValidationError::missing("assigned_to"))?;
        let note = format!("assigned to {assignee}");
        self.assigned_to = Some(assignee);
        self.apply(AlertStatus::Processing, Some(note), now);
        Ok(())
    }

    /// processing → resolved.
    pub fn resolve(
        &mut self,
        measures: &str,
        result: &str,
        now: Timestamp,
    ) -> Result<(), StateError> {
        self.require_transition(AlertStatus::Resolved)?;
        let measures = non_blank(Some(measures))
            .ok_or_else(|| ValidationError::missing("handling_measures"))?;
        let result =
            non_blank(Some(result)).ok_or_else(|| ValidationError::missing("handling_result"))?;
        self.handling_measures = Some(measures.to_string());
        self.handling_result = Some(result.to_string());
        self.handling_time = Some(now);
        self.apply(AlertStatus::Resolved, None, now);
        Ok(())
    }

    /// processing → pending.
    pub fn return_to_pending(&mut self, now: Timestamp) -> Result<(), StateError> {
        self.require_transition(AlertStatus::Pending)?;
        let note = self.assigned_to.take().map(|a| format!("unassigned from {a}"));
        self.apply(AlertStatus::Pending, note, now);
        Ok(())
    }

    /// resolved → closed, or processing → closed with a reason.
    pub fn close(&mut self, reason: Option<&str>, now: Timestamp) -> Result<(), StateError> {
        self.require_transition(AlertStatus::Closed)?;
        if self.status == AlertStatus::Processing {
            let reason = non_blank(reason).ok_or_else(|| ValidationError::new(
                "handling_result",
                "closing an alert under processing requires a closure reason",
            ))?;
            self.handling_result = Some(reason.to_string());
            let note = format!("closed: {reason}");
            self.apply(AlertStatus::Closed, Some(note), now);
        } else {
            self.apply(AlertStatus::Closed, None, now);
        }
        Ok(())
    }

    /// Link the recall created from this alert. Status is unchanged.
    ///
    /// # Errors
    ///
    /// `InvalidState` when the alert is closed or already linked.
    pub fn link_recall(
        &mut self,
        recall_code: RecallCode,
        now: Timestamp,
    ) -> Result<(), StateError> {
        if self.status.is_terminal() {
            return Err(self.invalid_state("link a recall"));
        }
        if let Some(existing) = &self.recall_code {
            return Err(self.invalid_state(&format!("link a recall; already linked to {existing}")));
        }
        self.recall_initiated = true;
        self.recall_code = Some(recall_code);
        self.updated_at = now;
        Ok(())
    }

    /// Operation check used before escalation.
    pub fn ensure_escalatable(&self) -> Result<(), StateError> {
        if self.status.is_terminal() {
            return Err(self.invalid_state("escalate to a recall"));
        }
        if let Some(existing) = &self.recall_code {
            return Err(self.invalid_state(&format!("escalate; already linked to {existing}")));
        }
        Ok(())
    }

    fn require_transition(&self, to: AlertStatus) -> Result<(), StateError> {
        if self.status.can_transition_to(to) {
            return Ok(());
        }
        Err(StateError::InvalidTransition {
            entity: "alert",
            code: self.alert_code.to_string(),
            from: self.status.as_str().to_string(),
            to: to.as_str().to_string(),
        })
    }

    fn invalid_state(&self, operation: &str) -> StateError {
        StateError::InvalidState {
            entity: "alert",
            code: self.alert_code.to_string(),
            state: self.status.as_str().to_string(),
            operation: operation.to_string(),
        }
    }

    fn apply(&mut self, to: AlertStatus, note: Option<String>, now: Timestamp) {
        tracing::debug!(
            alert_code = %self.alert_code,
            from = %self.status,
            to = %to,
            "alert transition"
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

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    fn alert() -> Alert {
        Alert::raise(
            AlertCode::new("ALT-20240601-000001").unwrap(),
            AlertDraft {
                traceability_code: TraceabilityCode::new("TRC-9").unwrap(),
                product_name: "Oat milk".to_string(),
                alert_type: AlertType::Contaminated,
                alert_level: AlertLevel::Critical,
                title: "Listeria positive".to_string(),
                description: "Lab sample positive".to_string(),
                evidence_images: vec!["img/lab-1.png".to_string()],
                reporter: Reporter::new("u-7", "Inspector Ngata"),
                origin: AlertOrigin::Manual,
            },
            ts("2024-06-01T08:00:00Z"),
        )
    }

    #[test]
    fn full_lifecycle_to_closed() {
        let mut a = alert();
        a.start_processing(Some("qa-lead"), ts("2024-06-01T09:00:00Z")).unwrap();
        assert_eq!(a.status, AlertStatus::Processing);
        assert_eq!(a.assigned_to.as_deref(), Some("qa-lead"));

        a.resolve("Batch quarantined", "Supplier notified", ts("2024-06-02T09:00:00Z")).unwrap();
        assert_eq!(a.status, AlertStatus::Resolved);
        assert_eq!(a.handling_time, Some(ts("2024-06-02T09:00:00Z")));

        a.close(None, ts("2024-06-03T09:00:00Z")).unwrap();
        assert_eq!(a.status, AlertStatus::Closed);
        assert_eq!(a.transition_log.len(), 3);
        assert_eq!(a.updated_at, ts("2024-06-03T09:00:00Z"));
    }

    #[test]
    fn pending_to_resolved_is_rejected() {
        let mut a = alert();
        let before = a.clone();
        let err = a.resolve("m", "r", ts("2024-06-01T09:00:00Z")).unwrap_err();
        assert!(err.is_invalid_transition());
        assert_eq!(a, before);
    }

    #[test]
    fn every_pair_outside_table_is_rejected() {
        let now = ts("2024-06-01T09:00:00Z");
        for from in AlertStatus::all() {
            for to in AlertStatus::all() {
                if from.can_transition_to(*to) {
                    continue;
                }
                let mut a = alert();
                a.status = *from;
                a.assigned_to = Some("x".into());
                let before = a.clone();
                let update = UpdateAlertStatusRequest {
                    status: *to,
                    handling_measures: Some("m".into()),
                    handling_result: Some("r".into()),
                    assigned_to: Some("y".into()),
                };
                let err = a.apply_update(&update, now).unwrap_err();
                assert!(err.is_invalid_transition(), "{from} -> {to}: {err}");
                assert_eq!(a, before);
            }
        }
    }

    #[test]
    fn guards_report_missing_fields() {
        let now = ts("2024-06-01T09:00:00Z");
        let mut a = alert();
        let err = a.start_processing(Some("  "), now).unwrap_err();
        assert!(matches!(&err, StateError::Validation(v) if v.field == "assigned_to"));
        assert_eq!(a.status, AlertStatus::Pending);

        a.start_processing(Some("qa"), now).unwrap();
        let before = a.clone();
        let err = a.resolve("quarantine", "", now).unwrap_err();
        assert!(matches!(&err, StateError::Validation(v) if v.field == "handling_result"));
        let err = a.close(None, now).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(a, before);
    }

    #[test]
    fn back_to_pending_clears_assignee() {
        let now = ts("2024-06-01T09:00:00Z");
        let mut a = alert();
        a.start_processing(Some("qa"), now).unwrap();
        a.return_to_pending(now).unwrap();
        assert!(a.assigned_to.is_none());
        assert!(a.start_processing(None, now).unwrap_err().is_validation());
    }

    #[test]
    fn closing_from_processing_records_reason() {
        let now = ts("2024-06-01T09:00:00Z");
        let mut a = alert();
        a.start_processing(Some("qa"), now).unwrap();
        a.close(Some("Duplicate of ALT-3"), now).unwrap();
        assert_eq!(a.handling_result.as_deref(), Some("Duplicate of ALT-3"));
    }

    #[test]
    fn link_recall_sets_both_fields_once() {
        let now = ts("2024-06-01T09:00:00Z");
        let mut a = alert();
        assert!(a.recall_link_consistent());
        a.link_recall(RecallCode::new("RCL-1").unwrap(), now).unwrap();
        assert!(a.recall_initiated);
        assert_eq!(a.status, AlertStatus::Pending);
        assert!(a.recall_link_consistent());

        let err = a.link_recall(RecallCode::new("RCL-2").unwrap(), now).unwrap_err();
        assert!(err.is_invalid_state());
        assert_eq!(a.recall_code.as_ref().map(|c| c.as_str()), Some("RCL-1"));
    }

    #[test]
    fn closed_alert_cannot_link() {
        let now = ts("2024-06-01T09:00:00Z");
        let mut a = alert();
        a.status = AlertStatus::Closed;
        let err = a.link_recall(RecallCode::new("RCL-1").unwrap(), now).unwrap_err();
        assert!(err.is_invalid_state());
        assert!(!a.recall_initiated);
    }

    #[test]
    fn serializes_with_flat_reporter() {
        let a = alert();
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["reporter_name"], "Inspector Ngata");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["origin"]["kind"], "manual");
        assert_eq!(json["created_at"], "2024-06-01T08:00:00Z");
    }
}
