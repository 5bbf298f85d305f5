//! # Inbound Request Shapes
//!
//! Wire shapes for the operations a transport layer exposes. Field names
//! are the snake_case JSON names clients already send. Each request checks
//! its own required fields in `validate()`; the `into_*` conversions
//! validate first and then build the typed value the state machines take.

use safetrace_core::{
    require_non_blank, AlertCode, AlertLevel, AlertStatus, AlertType, RecallCode, Timestamp,
    TraceabilityCode, ValidationError,
};
use serde::{Deserialize, Serialize};

use crate::alert::{AlertDraft, AlertOrigin, Reporter};
use crate::process::RecallProcess;
use crate::recall::{Initiator, RecallDraft};

/// Manually report an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateAlertRequest {
    /// Traced item.
    pub traceability_code: String,
    /// Product name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    /// Alert type.
    pub alert_type: AlertType,
    /// Alert level.
    pub alert_level: AlertLevel,
    /// Title.
    pub title: String,
    /// Description.
    pub description: String,
    /// Evidence image references.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_images: Option<Vec<String>>,
}

impl CreateAlertRequest {
    /// Check required fields.
    pub fn validate(&self) -> Result<(), ValidationError> {
        TraceabilityCode::new(self.traceability_code.as_str())?;
        require_non_blank("title", &self.title)?;
        require_non_blank("description", &self.description)?;
        Ok(())
    }

    /// Validate and turn into a manual alert draft.
    pub fn into_draft(self, reporter: Reporter) -> Result<AlertDraft, ValidationError> {
        self.validate()?;
        require_non_blank("reporter_id", &reporter.reporter_id)?;
        Ok(AlertDraft {
            traceability_code: TraceabilityCode::new(self.traceability_code)?,
            product_name: self.product_name.unwrap_or_default().trim().to_string(),
            alert_type: self.alert_type,
            alert_level: self.alert_level,
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            evidence_images: self.evidence_images.unwrap_or_default(),
            reporter,
            origin: AlertOrigin::Manual,
        })
    }
}

/// Move an alert to another status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateAlertStatusRequest {
    /// Target status.
    pub status: AlertStatus,
    /// Measures taken (required to resolve).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handling_measures: Option<String>,
    /// Outcome (required to resolve) or closure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handling_result: Option<String>,
    /// Assignee (required to start processing unless already assigned).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
}

impl UpdateAlertStatusRequest {
    /// A bare status change.
    pub fn to(status: AlertStatus) -> Self {
        Self {
            status,
            handling_measures: None,
            handling_result: None,
            assigned_to: None,
        }
    }

    /// Reject fields given but blank. Whether a field is required depends on
    /// the alert's current state and is checked by the transition itself.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("handling_measures", &self.handling_measures),
            ("handling_result", &self.handling_result),
            ("assigned_to", &self.assigned_to),
        ] {
            if let Some(v) = value {
                require_non_blank(field, v)?;
            }
        }
        Ok(())
    }
}

/// Open a recall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRecallRequest {
    /// Traced item.
    pub traceability_code: String,
    /// Product name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    /// Originating alert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_code: Option<String>,
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
    /// Items to recall, when already known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_quantity: Option<i64>,
}

impl CreateRecallRequest {
    /// Check required fields.
    pub fn validate(&self) -> Result<(), ValidationError> {
        TraceabilityCode::new(self.traceability_code.as_str())?;
        if let Some(code) = self.alert_code.as_deref().filter(|c| !c.trim().is_empty()) {
            AlertCode::new(code)?;
        }
        require_non_blank("recall_reason", &self.recall_reason)?;
        require_non_blank("recall_scope", &self.recall_scope)?;
        require_non_blank("recall_instructions", &self.recall_instructions)?;
        if let Some(q) = self.affected_quantity {
            non_negative("affected_quantity", q)?;
        }
        Ok(())
    }

    /// Validate and turn into a recall draft.
    pub fn into_draft(self, initiator: Initiator) -> Result<RecallDraft, ValidationError> {
        self.validate()?;
        require_non_blank("initiator_id", &initiator.initiator_id)?;
        let alert_code = match self.alert_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => Some(AlertCode::new(code)?),
            _ => None,
        };
        Ok(RecallDraft {
            alert_code,
            traceability_code: TraceabilityCode::new(self.traceability_code)?,
            product_name: self.product_name.unwrap_or_default().trim().to_string(),
            batch_number: trimmed(self.batch_number),
            recall_reason: self.recall_reason.trim().to_string(),
            recall_level: self.recall_level,
            recall_scope: self.recall_scope.trim().to_string(),
            recall_instructions: self.recall_instructions.trim().to_string(),
            public_notice: trimmed(self.public_notice),
            affected_quantity: self.affected_quantity.map(|q| q.unsigned_abs()).unwrap_or(0),
            initiator,
        })
    }
}

/// Record a unit of recall work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordProcessRequest {
    /// Kind of work.
    pub process_type: String,
    /// Free-text description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Handler identity.
    pub processed_by: String,
    /// Handler name.
    pub processed_by_name: String,
    /// Items handled.
    pub processed_quantity: i64,
    /// Where the work was done.
    pub location: String,
    /// Evidence image references.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_images: Option<Vec<String>>,
}

impl RecordProcessRequest {
    /// Check required fields.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_blank("process_type", &self.process_type)?;
        require_non_blank("processed_by", &self.processed_by)?;
        require_non_blank("processed_by_name", &self.processed_by_name)?;
        require_non_blank("location", &self.location)?;
        non_negative("processed_quantity", self.processed_quantity)?;
        Ok(())
    }

    /// Validate and turn into an event for `recall_code` at `at`.
    pub fn into_process(
        self,
        recall_code: RecallCode,
        at: Timestamp,
    ) -> Result<RecallProcess, ValidationError> {
        self.validate()?;
        Ok(RecallProcess {
            recall_code,
            process_type: self.process_type.trim().to_string(),
            description: self.description.unwrap_or_default(),
            processed_by: self.processed_by.trim().to_string(),
            processed_by_name: self.processed_by_name.trim().to_string(),
            processed_quantity: self.processed_quantity.unsigned_abs(),
            process_time: at,
            location: self.location.trim().to_string(),
            evidence_images: self.evidence_images.unwrap_or_default(),
        })
    }
}

/// Approve a draft recall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveRecallRequest {
    /// Approver identity.
    pub approved_by: String,
    /// Comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_comment: Option<String>,
}

impl ApproveRecallRequest {
    /// Check required fields.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_blank("approved_by", &self.approved_by)
    }
}

fn non_negative(field: &str, value: i64) -> Result<(), ValidationError> {
    if value < 0 {
        return Err(ValidationError::new(field, format!("must not be negative, got {value}")));
    }
    Ok(())
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_alert_requires_title_and_code() {
        let req: CreateAlertRequest = serde_json::from_value(json!({
            "traceability_code": "TRC-1",
            "alert_type": "fake",
            "alert_level": "medium",
            "title": " ",
            "description": "Hologram missing"
        }))
        .unwrap();
        assert_eq!(req.validate().unwrap_err().field, "title");

        let bad_type = serde_json::from_value::<CreateAlertRequest>(json!({
            "traceability_code": "TRC-1",
            "alert_type": "mystery",
            "alert_level": "medium",
            "title": "x",
            "description": "y"
        }));
        assert!(bad_type.is_err());
    }

    #[test]
    fn create_alert_builds_manual_draft() {
        let req: CreateAlertRequest = serde_json::from_value(json!({
            "traceability_code": "TRC-1",
            "product_name": " Honey ",
            "alert_type": "quality",
            "alert_level": "low",
            "title": "Crystallised",
            "description": "Texture complaint",
            "evidence_images": ["a.png"]
        }))
        .unwrap();
        let draft = req.into_draft(Reporter::new("u-1", "Shopper")).unwrap();
        assert_eq!(draft.product_name, "Honey");
        assert_eq!(draft.origin, AlertOrigin::Manual);
        assert_eq!(draft.evidence_images, ["a.png"]);
    }

    #[test]
    fn update_status_rejects_blank_fields() {
        let mut req = UpdateAlertStatusRequest::to(AlertStatus::Processing);
        assert!(req.validate().is_ok());
        req.assigned_to = Some("".into());
        assert_eq!(req.validate().unwrap_err().field, "assigned_to");
    }

    #[test]
    fn create_recall_validation() {
        let mut req: CreateRecallRequest = serde_json::from_value(json!({
            "traceability_code": "TRC-1",
            "alert_code": "ALT-1",
            "recall_reason": "Undeclared peanuts",
            "recall_level": "high",
            "recall_scope": "National",
            "recall_instructions": "Return for refund",
            "affected_quantity": 250
        }))
        .unwrap();
        assert!(req.validate().is_ok());

        req.affected_quantity = Some(-1);
        assert_eq!(req.validate().unwrap_err().field, "affected_quantity");

        req.affected_quantity = Some(250);
        let draft = req.clone().into_draft(Initiator::operator("u-1", "Officer")).unwrap();
        assert_eq!(draft.affected_quantity, 250);
        assert_eq!(draft.alert_code.unwrap().as_str(), "ALT-1");

        req.recall_scope = String::new();
        assert_eq!(req.validate().unwrap_err().field, "recall_scope");
    }

    #[test]
    fn record_process_validation_and_conversion() {
        let req: RecordProcessRequest = serde_json::from_value(json!({
            "process_type": "retrieval",
            "processed_by": "u-5",
            "processed_by_name": "Driver",
            "processed_quantity": 12,
            "location": "Depot 4"
        }))
        .unwrap();
        let at = Timestamp::parse("2024-06-02T10:00:00Z").unwrap();
        let p = req.clone().into_process(RecallCode::new("RCL-1").unwrap(), at).unwrap();
        assert_eq!(p.processed_quantity, 12);
        assert_eq!(p.process_time, at);

        let mut neg = req;
        neg.processed_quantity = -3;
        assert_eq!(neg.validate().unwrap_err().field, "processed_quantity");
    }

    #[test]
    fn approve_requires_approver() {
        let req = ApproveRecallRequest {
            approved_by: "  ".into(),
            approval_comment: None,
        };
        assert_eq!(req.validate().unwrap_err().field, "approved_by");
    }
}
