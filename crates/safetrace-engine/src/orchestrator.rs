//! # Recall Lifecycle Orchestrator
//!
//! Owns the alert and recall registries and wires detection to the state
//! machines:
//!
//! ```text
//! DetectAnomalyRequest ─▶ DetectionService ─▶ ProposedAlert ─▶ Alert (pending)
//!                                                               │ escalate
//!                                                               ▼
//!            RecordProcessRequest ─▶ RecallProcess ─▶ ProductRecall (draft → active)
//!                                         │ progress reaches 100%
//!                                         ▼
//!                                  ProductRecall (complete)
//! ```
//!
//! ## Locking
//!
//! Every mutation of an alert runs under that alert's entry lock, and every
//! mutation of a recall under that recall's entry lock. Escalation holds the
//! alert lock while it creates and registers the recall, so an alert can be
//! escalated once. Appending a process, applying progress and auto-completing
//! happen under a single recall lock. No operation takes a recall lock and
//! then an alert lock.

use std::sync::Arc;

use safetrace_core::{
    AlertCode, Clock, CodeGenerator, RecallCode, SequenceCodeGenerator, SystemClock, Timestamp,
    TraceabilityCode, ValidationError,
};
use safetrace_rules::{
    DetectAnomalyRequest, DetectionReport, DetectionService, ProposedAlert, ReloadReport,
    RuleCatalog, RuleDefinition,
};
use safetrace_state::{
    Alert, AlertDraft, AlertOrigin, ApproveRecallRequest, CreateAlertRequest, CreateRecallRequest,
    Initiator, ProductRecall, ProgressUpdate, RecallProcess, RecordProcessRequest, Reporter,
    UpdateAlertStatusRequest,
};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::registry::Registry;

/// Transition note written on automatic completion.
const AUTO_COMPLETE_NOTE: &str = "recalled quantity reached affected quantity";

/// A recall and the process events appended to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecallEntry {
    /// The recall.
    pub recall: ProductRecall,
    /// Accepted process events, in arrival order.
    pub processes: Vec<RecallProcess>,
}

/// Result of recording a recall process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessOutcome {
    /// The appended event.
    pub process: RecallProcess,
    /// Progress after the event.
    pub update: ProgressUpdate,
    /// Whether the recall was completed by this event.
    pub auto_completed: bool,
    /// The recall after the event.
    pub recall: ProductRecall,
}

/// Alerts raised from one detection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaisedAlerts {
    /// The detection report.
    pub report: DetectionReport,
    /// Registered alerts, one per proposed alert, in the same order.
    pub alerts: Vec<Alert>,
}

/// The recall lifecycle orchestrator.
pub struct Orchestrator {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    codes: Arc<dyn CodeGenerator>,
    catalog: Arc<RuleCatalog>,
    detection: DetectionService,
    alerts: Registry<AlertCode, Alert>,
    recalls: Registry<RecallCode, RecallEntry>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("catalog_version", &self.catalog.version())
            .field("alerts", &self.alerts.len())
            .field("recalls", &self.recalls.len())
            .finish()
    }
}

impl Orchestrator {
    /// Orchestrator with an injected clock and code generator.
    pub fn new(config: EngineConfig, clock: Arc<dyn Clock>, codes: Arc<dyn CodeGenerator>) -> Self {
        let catalog = Arc::new(RuleCatalog::new());
        let detection = DetectionService::new(Arc::clone(&catalog))
            .with_scope_field(config.scope_field.clone())
            .with_trace(config.include_trace);
        Self {
            config,
            clock,
            codes,
            catalog,
            detection,
            alerts: Registry::new(),
            recalls: Registry::new(),
        }
    }

    /// Orchestrator on the system clock with sequential codes using the
    /// configured prefixes.
    pub fn from_config(config: EngineConfig) -> Self {
        let codes = SequenceCodeGenerator::new(
            config.alert_prefix.clone(),
            config.recall_prefix.clone(),
        );
        Self::new(config, Arc::new(SystemClock), Arc::new(codes))
    }

    /// The active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The rule catalog.
    pub fn catalog(&self) -> &Arc<RuleCatalog> {
        &self.catalog
    }

    fn now(&self) -> Timestamp {
        self.clock.now()
    }

    // ─── Rules & Detection ───────────────────────────────────────────

    /// Replace the active rule set.
    pub fn reload_rules(&self, definitions: &[RuleDefinition]) -> ReloadReport {
        self.catalog.reload(definitions)
    }

    /// Reload rules from the configured rule file.
    pub fn reload_rules_from_config(&self) -> Result<ReloadReport, EngineError> {
        let definitions = self.config.load_rules()?;
        Ok(self.reload_rules(&definitions))
    }

    /// Run detection without registering anything.
    pub fn detect(&self, request: &DetectAnomalyRequest) -> Result<DetectionReport, EngineError> {
        Ok(self.detection.detect(request, self.now())?)
    }

    /// Run detection and register an alert for every proposal.
    pub fn detect_and_raise(
        &self,
        request: &DetectAnomalyRequest,
    ) -> Result<RaisedAlerts, EngineError> {
        let report = self.detect(request)?;
        let alerts = report
            .alerts
            .iter()
            .map(|proposal| self.raise_proposed(proposal))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RaisedAlerts { report, alerts })
    }

    /// Register a proposed alert under a fresh code.
    pub fn raise_proposed(&self, proposal: &ProposedAlert) -> Result<Alert, EngineError> {
        let actor = &self.config.automated_reporter;
        let draft = AlertDraft {
            traceability_code: proposal.traceability_code.clone(),
            product_name: proposal.product_name.clone().unwrap_or_default(),
            alert_type: proposal.alert_type,
            alert_level: proposal.alert_level,
            title: proposal.title.clone(),
            description: proposal.description.clone(),
            evidence_images: Vec::new(),
            reporter: Reporter::new(actor.id.clone(), actor.name.clone()),
            origin: AlertOrigin::Detection {
                rule_code: proposal.rule_code.clone(),
            },
        };
        self.register_alert(draft)
    }

    // ─── Alerts ──────────────────────────────────────────────────────

    /// Register a manually reported alert.
    pub fn report_alert(
        &self,
        request: CreateAlertRequest,
        reporter: Reporter,
    ) -> Result<Alert, EngineError> {
        let draft = request.into_draft(reporter)?;
        self.register_alert(draft)
    }

    fn register_alert(&self, draft: AlertDraft) -> Result<Alert, EngineError> {
        let now = self.now();
        let code = self.codes.next_alert_code(now);
        let alert = Alert::raise(code.clone(), draft, now);
        if self.alerts.insert(code.clone(), alert.clone()).is_err() {
            return Err(EngineError::DuplicateCode {
                entity: "alert",
                code: code.to_string(),
            });
        }
        tracing::info!(
            alert_code = %code,
            traceability_code = %alert.traceability_code,
            alert_type = %alert.alert_type,
            alert_level = %alert.alert_level,
            rule_code = alert.rule_code().map(|c| c.as_str()).unwrap_or(""),
            "alert raised"
        );
        Ok(alert)
    }

    /// Apply a status update to an alert.
    pub fn update_alert_status(
        &self,
        code: &AlertCode,
        request: &UpdateAlertStatusRequest,
    ) -> Result<Alert, EngineError> {
        request.validate()?;
        let now = self.now();
        self.alerts
            .with(code, |alert| -> Result<Alert, EngineError> {
                alert.apply_update(request, now)?;
                Ok(alert.clone())
            })
            .unwrap_or_else(|| Err(EngineError::not_found("alert", code)))
    }

    /// A copy of an alert.
    pub fn alert(&self, code: &AlertCode) -> Result<Alert, EngineError> {
        self.alerts.get(code).ok_or_else(|| EngineError::not_found("alert", code))
    }

    /// All alerts in code order.
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.values()
    }

    /// Alerts raised for one traced item.
    pub fn alerts_for(&self, traceability_code: &TraceabilityCode) -> Vec<Alert> {
        self.alerts
            .values()
            .into_iter()
            .filter(|a| &a.traceability_code == traceability_code)
            .collect()
    }

    // ─── Recalls ─────────────────────────────────────────────────────

    /// Create a recall from an alert and link the two.
    ///
    /// # Errors
    ///
    /// `InvalidState` when the alert is closed or already escalated; a
    /// validation error when the request names a different alert.
    pub fn escalate(
        &self,
        alert_code: &AlertCode,
        mut request: CreateRecallRequest,
        initiator: Initiator,
    ) -> Result<ProductRecall, EngineError> {
        let named = request
            .alert_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty() && *c != alert_code.as_str())
            .map(str::to_string);
        if let Some(named) = named {
            return Err(ValidationError::new(
                "alert_code",
                format!("request names {named} but escalation is for {alert_code}"),
            )
            .into());
        }
        request.alert_code = Some(alert_code.to_string());

        let entry = self
            .alerts
            .entry(alert_code)
            .ok_or_else(|| EngineError::not_found("alert", alert_code))?;
        let mut alert = entry.lock();
        alert.ensure_escalatable()?;

        if request.product_name.as_deref().map_or(true, |n| n.trim().is_empty()) {
            request.product_name = Some(alert.product_name.clone());
        }
        let recall = self.open_recall(request, initiator)?;
        alert.link_recall(recall.recall_code.clone(), recall.created_at)?;
        tracing::info!(
            alert_code = %alert_code,
            recall_code = %recall.recall_code,
            "alert escalated to recall"
        );
        Ok(recall)
    }

    /// Create a recall. A request naming an alert escalates that alert.
    pub fn create_recall(
        &self,
        request: CreateRecallRequest,
        initiator: Initiator,
    ) -> Result<ProductRecall, EngineError> {
        if let Some(code) = request.alert_code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            let alert_code = AlertCode::new(code)?;
            return self.escalate(&alert_code, request, initiator);
        }
        self.open_recall(request, initiator)
    }

    fn open_recall(
        &self,
        request: CreateRecallRequest,
        initiator: Initiator,
    ) -> Result<ProductRecall, EngineError> {
        let draft = request.into_draft(initiator)?;
        let now = self.now();
        let code = self.codes.next_recall_code(now);
        let recall = ProductRecall::draft(code.clone(), draft, now)?;
        let entry = RecallEntry {
            recall: recall.clone(),
            processes: Vec::new(),
        };
        if self.recalls.insert(code.clone(), entry).is_err() {
            return Err(EngineError::DuplicateCode {
                entity: "recall",
                code: code.to_string(),
            });
        }
        tracing::info!(
            recall_code = %code,
            alert_code = recall.alert_code.as_ref().map(|c| c.as_str()).unwrap_or(""),
            recall_level = %recall.recall_level,
            "recall drafted"
        );
        Ok(recall)
    }

    /// Set a draft recall's affected quantity.
    pub fn set_affected_quantity(
        &self,
        code: &RecallCode,
        quantity: u64,
    ) -> Result<ProductRecall, EngineError> {
        let now = self.now();
        self.with_recall(code, |entry| {
            entry.recall.set_affected_quantity(quantity, now)?;
            Ok(entry.recall.clone())
        })
    }

    /// Approve a draft recall.
    pub fn approve_recall(
        &self,
        code: &RecallCode,
        request: &ApproveRecallRequest,
    ) -> Result<ProductRecall, EngineError> {
        request.validate()?;
        let now = self.now();
        self.with_recall(code, |entry| {
            entry
                .recall
                .approve(&request.approved_by, request.approval_comment.as_deref(), now)?;
            Ok(entry.recall.clone())
        })
    }

    /// draft → active.
    pub fn activate_recall(&self, code: &RecallCode) -> Result<ProductRecall, EngineError> {
        let now = self.now();
        self.with_recall(code, |entry| {
            entry.recall.activate(now)?;
            tracing::info!(
                recall_code = %code,
                affected = entry.recall.affected_quantity,
                "recall activated"
            );
            Ok(entry.recall.clone())
        })
    }

    /// draft/active → cancelled.
    pub fn cancel_recall(
        &self,
        code: &RecallCode,
        reason: Option<&str>,
    ) -> Result<ProductRecall, EngineError> {
        let now = self.now();
        self.with_recall(code, |entry| {
            entry.recall.cancel(reason, now)?;
            tracing::info!(recall_code = %code, "recall cancelled");
            Ok(entry.recall.clone())
        })
    }

    /// active → complete, by operator action.
    pub fn complete_recall(&self, code: &RecallCode) -> Result<ProductRecall, EngineError> {
        let now = self.now();
        self.with_recall(code, |entry| {
            entry.recall.complete(Some("completed by operator"), now)?;
            tracing::info!(recall_code = %code, "recall completed");
            Ok(entry.recall.clone())
        })
    }

    /// Append a process event to an active recall and apply its progress.
    ///
    /// When the event brings the recall to its target and auto-completion
    /// is enabled, the recall is completed under the same lock.
    pub fn record_process(
        &self,
        code: &RecallCode,
        request: RecordProcessRequest,
    ) -> Result<ProcessOutcome, EngineError> {
        let now = self.now();
        let process = request.into_process(code.clone(), now)?;
        let auto_complete = self.config.auto_complete;
        self.with_recall(code, |entry| {
            let update = entry.recall.accept_process(&process, now)?;
            entry.processes.push(process.clone());

            let auto_completed = update.completed && auto_complete;
            if auto_completed {
                entry.recall.complete(Some(AUTO_COMPLETE_NOTE), now)?;
                tracing::info!(
                    recall_code = %code,
                    recalled = update.recalled_quantity,
                    "recall auto-completed"
                );
            }
            Ok(ProcessOutcome {
                process,
                update,
                auto_completed,
                recall: entry.recall.clone(),
            })
        })
    }

    /// A copy of a recall.
    pub fn recall(&self, code: &RecallCode) -> Result<ProductRecall, EngineError> {
        self.recalls
            .get(code)
            .map(|e| e.recall)
            .ok_or_else(|| EngineError::not_found("recall", code))
    }

    /// Process events of a recall, in arrival order.
    pub fn processes(&self, code: &RecallCode) -> Result<Vec<RecallProcess>, EngineError> {
        self.recalls
            .get(code)
            .map(|e| e.processes)
            .ok_or_else(|| EngineError::not_found("recall", code))
    }

    /// All recalls in code order.
    pub fn recalls(&self) -> Vec<ProductRecall> {
        self.recalls.values().into_iter().map(|e| e.recall).collect()
    }

    fn with_recall<R>(
        &self,
        code: &RecallCode,
        f: impl FnOnce(&mut RecallEntry) -> Result<R, EngineError>,
    ) -> Result<R, EngineError> {
        self.recalls
            .with(code, f)
            .unwrap_or_else(|| Err(EngineError::not_found("recall", code)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use safetrace_core::{AlertStatus, FixedClock, RecallStatus};
    use serde_json::json;

    struct Harness {
        clock: Arc<FixedClock>,
        engine: Orchestrator,
    }

    fn harness() -> Harness {
        let clock = Arc::new(FixedClock::new(Timestamp::parse("2024-06-01T08:00:00Z").unwrap()));
        let engine = Orchestrator::new(
            EngineConfig::default(),
            clock.clone(),
            Arc::new(SequenceCodeGenerator::default()),
        );
        engine.reload_rules(&[RuleDefinition {
            rule_code: "R-EXP".into(),
            rule_name: "Expired".into(),
            alert_type: "expired".into(),
            alert_level: "high".into(),
            trigger_conditions: json!({"field": "expiry_date", "op": "lt", "value": {"now": 0}}),
            ..RuleDefinition::default()
        }]);
        Harness { clock, engine }
    }

    fn expired_request() -> DetectAnomalyRequest {
        serde_json::from_value(json!({
            "traceability_code": "TRC-42",
            "product_data": {"expiry_date": "2020-01-01", "product_name": "Yoghurt"}
        }))
        .unwrap()
    }

    fn recall_request(affected: Option<i64>) -> CreateRecallRequest {
        CreateRecallRequest {
            traceability_code: "TRC-42".into(),
            product_name: None,
            alert_code: None,
            batch_number: Some("B-9".into()),
            recall_reason: "Expired stock on shelves".into(),
            recall_level: safetrace_core::AlertLevel::High,
            recall_scope: "Region 3".into(),
            recall_instructions: "Pull from shelves".into(),
            public_notice: None,
            affected_quantity: affected,
        }
    }

    fn process(qty: i64) -> RecordProcessRequest {
        RecordProcessRequest {
            process_type: "retrieval".into(),
            description: None,
            processed_by: "u-3".into(),
            processed_by_name: "Field team".into(),
            processed_quantity: qty,
            location: "Store 12".into(),
            evidence_images: None,
        }
    }

    #[test]
    fn detection_raises_coded_alerts() {
        let h = harness();
        let raised = h.engine.detect_and_raise(&expired_request()).unwrap();
        assert_eq!(raised.alerts.len(), 1);
        let alert = &raised.alerts[0];
        assert_eq!(alert.alert_code.as_str(), "ALT-20240601-000001");
        assert_eq!(alert.reporter.reporter_id, "system");
        assert_eq!(alert.product_name, "Yoghurt");
        assert_eq!(alert.rule_code().map(|c| c.as_str()), Some("R-EXP"));
        assert_eq!(h.engine.alerts().len(), 1);
    }

    #[test]
    fn escalation_links_alert_and_recall_once() {
        let h = harness();
        let alert = h.engine.detect_and_raise(&expired_request()).unwrap().alerts.remove(0);
        let recall = h
            .engine
            .escalate(
                &alert.alert_code,
                recall_request(Some(100)),
                Initiator::automated("system", "detector"),
            )
            .unwrap();
        assert_eq!(recall.status, RecallStatus::Draft);
        assert_eq!(recall.alert_code.as_ref(), Some(&alert.alert_code));
        assert_eq!(recall.product_name, "Yoghurt");

        let linked = h.engine.alert(&alert.alert_code).unwrap();
        assert!(linked.recall_initiated);
        assert_eq!(linked.recall_code.as_ref(), Some(&recall.recall_code));
        assert_eq!(linked.status, AlertStatus::Pending);

        let again = h
            .engine
            .escalate(&alert.alert_code, recall_request(Some(100)), Initiator::operator("u", "x"))
            .unwrap_err();
        assert!(again.is_invalid_state());
        assert_eq!(h.engine.recalls().len(), 1);
    }

    #[test]
    fn full_recall_auto_completes() {
        let h = harness();
        let recall = h
            .engine
            .create_recall(recall_request(Some(100)), Initiator::operator("u-1", "Officer"))
            .unwrap();
        let code = recall.recall_code.clone();

        let err = h.engine.activate_recall(&code).unwrap_err();
        assert!(err.is_validation());

        let approval = ApproveRecallRequest {
            approved_by: "director".into(),
            approval_comment: None,
        };
        h.engine.approve_recall(&code, &approval).unwrap();
        h.clock.advance_secs(60);
        h.engine.activate_recall(&code).unwrap();

        let first = h.engine.record_process(&code, process(40)).unwrap();
        assert!(!first.auto_completed);
        let second = h.engine.record_process(&code, process(70)).unwrap();
        assert!(second.update.completed);
        assert!(second.auto_completed);
        assert_eq!(second.update.capacity_exceeded.map(|c| c.excess), Some(10));
        assert_eq!(second.recall.status, RecallStatus::Complete);
        assert_eq!(second.recall.recalled_quantity, 100);

        assert_eq!(h.engine.processes(&code).unwrap().len(), 2);
        assert!(h.engine.record_process(&code, process(1)).unwrap_err().is_invalid_state());
    }

    #[test]
    fn unknown_codes_are_not_found() {
        let h = harness();
        let missing = RecallCode::new("RCL-NOPE").unwrap();
        assert!(h.engine.recall(&missing).unwrap_err().is_not_found());
        assert!(h.engine.activate_recall(&missing).unwrap_err().is_not_found());
        let alert = AlertCode::new("ALT-NOPE").unwrap();
        let update = UpdateAlertStatusRequest::to(AlertStatus::Processing);
        assert!(h.engine.update_alert_status(&alert, &update).unwrap_err().is_not_found());
    }

    #[test]
    fn manual_alert_walks_its_lifecycle() {
        let h = harness();
        let request: CreateAlertRequest = serde_json::from_value(json!({
            "traceability_code": "TRC-7",
            "alert_type": "fake",
            "alert_level": "critical",
            "title": "Counterfeit label",
            "description": "Hologram missing"
        }))
        .unwrap();
        let alert = h.engine.report_alert(request, Reporter::new("u-9", "Pharmacist")).unwrap();
        let code = alert.alert_code;

        let err = h
            .engine
            .update_alert_status(&code, &UpdateAlertStatusRequest::to(AlertStatus::Resolved))
            .unwrap_err();
        assert!(err.is_invalid_transition());

        let mut update = UpdateAlertStatusRequest::to(AlertStatus::Processing);
        update.assigned_to = Some("inspector".into());
        let updated = h.engine.update_alert_status(&code, &update).unwrap();
        assert_eq!(updated.status, AlertStatus::Processing);
        assert_eq!(h.engine.alerts_for(&TraceabilityCode::new("TRC-7").unwrap()).len(), 1);
    }

    #[test]
    fn create_recall_rejects_unknown_alert() {
        let h = harness();
        let mut req = recall_request(None);
        req.alert_code = Some("ALT-MISSING".into());
        let err = h.engine.create_recall(req, Initiator::operator("u", "x")).unwrap_err();
        assert!(err.is_not_found());
        assert!(h.engine.recalls().is_empty());
    }
}
