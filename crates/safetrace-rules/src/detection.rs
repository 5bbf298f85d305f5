//! # Anomaly Detection
//!
//! Runs one product payload against the active rule snapshot and proposes an
//! alert for every rule that matches. Detection has no side effects beyond
//! its report and tracing events: proposed alerts carry no code, and it is
//! the orchestrator that registers them.
//!
//! ## Candidate Selection
//!
//! 1. The product category is read from the configured scope field
//!    (`category` by default). A missing or non-text value selects global
//!    rules only.
//! 2. If the request names a rule subset, candidates are restricted to it.
//!    Requested codes that are unknown or disabled are reported as
//!    unavailable; codes rejected at load are reported as skipped.
//! 3. Candidates are evaluated in rule-code order, so the same rules, data
//!    and evaluation time always yield the same report.

use std::collections::BTreeSet;
use std::sync::Arc;

use safetrace_core::{
    require_non_blank, AlertLevel, AlertStatus, AlertType, RuleCode, Timestamp, TraceabilityCode,
    ValidationError,
};
use serde::{Deserialize, Serialize};

use crate::catalog::{RuleCatalog, SkippedRule};
use crate::evaluator::{Evaluator, LeafTrace};
use crate::rule::AlertRule;
use crate::value::ProductData;

/// Default product field holding the detection category.
pub const DEFAULT_SCOPE_FIELD: &str = "category";

/// Product field read for the proposed alert's product name.
pub const PRODUCT_NAME_FIELD: &str = "product_name";

/// Request to check one product payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectAnomalyRequest {
    /// Traced item the payload describes.
    pub traceability_code: String,
    /// Product attributes.
    pub product_data: ProductData,
    /// Restrict detection to these rule codes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection_rules: Option<Vec<String>>,
}

impl DetectAnomalyRequest {
    /// Check required fields.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_blank("traceability_code", &self.traceability_code)?;
        if let Some(codes) = &self.detection_rules {
            if codes.iter().any(|c| c.trim().is_empty()) {
                return Err(ValidationError::new(
                    "detection_rules",
                    "rule codes must not be blank",
                ));
            }
        }
        Ok(())
    }

    /// The requested rule subset, trimmed and deduplicated. `None` when the
    /// request does not restrict rules (absent or empty list).
    fn subset(&self) -> Option<BTreeSet<String>> {
        let codes = self.detection_rules.as_ref()?;
        let set: BTreeSet<String> = codes.iter().map(|c| c.trim().to_string()).collect();
        (!set.is_empty()).then_some(set)
    }
}

/// An alert a matching rule proposes. It has no code until registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedAlert {
    /// Traced item.
    pub traceability_code: TraceabilityCode,
    /// Product name, when the payload carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    /// Type from the rule.
    pub alert_type: AlertType,
    /// Level from the rule.
    pub alert_level: AlertLevel,
    /// `"<rule name> [<rule code>]"`.
    pub title: String,
    /// Names the rule and the fields it matched on.
    pub description: String,
    /// Always `pending`.
    pub status: AlertStatus,
    /// Rule that fired.
    pub rule_code: RuleCode,
    /// Product fields whose leaves matched.
    pub matched_fields: Vec<String>,
    /// Leaf trace, when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<LeafTrace>>,
}

/// Result of one detection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    /// Traced item.
    pub traceability_code: TraceabilityCode,
    /// Evaluation instant.
    pub evaluated_at: Timestamp,
    /// Category read from the payload, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Version of the rule snapshot used.
    pub catalog_version: u64,
    /// Rules evaluated, in order.
    pub evaluated: Vec<RuleCode>,
    /// One entry per matching rule.
    pub alerts: Vec<ProposedAlert>,
    /// Requested codes that are unknown or disabled.
    #[serde(default)]
    pub unavailable_rules: Vec<String>,
    /// Requested codes that were rejected at load.
    #[serde(default)]
    pub skipped: Vec<SkippedRule>,
    /// Requested codes of enabled rules whose scope excludes the product.
    #[serde(default)]
    pub out_of_scope_rules: Vec<String>,
}

impl DetectionReport {
    /// Whether any rule matched.
    pub fn has_alerts(&self) -> bool {
        !self.alerts.is_empty()
    }
}

/// Evaluates payloads against a [`RuleCatalog`].
#[derive(Debug, Clone)]
pub struct DetectionService {
    catalog: Arc<RuleCatalog>,
    scope_field: String,
    include_trace: bool,
}

impl DetectionService {
    /// Service reading the category from [`DEFAULT_SCOPE_FIELD`].
    pub fn new(catalog: Arc<RuleCatalog>) -> Self {
        Self {
            catalog,
            scope_field: DEFAULT_SCOPE_FIELD.to_string(),
            include_trace: false,
        }
    }

    /// Read the category from `field` instead.
    pub fn with_scope_field(mut self, field: impl Into<String>) -> Self {
        self.scope_field = field.into();
        self
    }

    /// Attach leaf traces to proposed alerts.
    pub fn with_trace(mut self, include: bool) -> Self {
        self.include_trace = include;
        self
    }

    /// The catalog this service reads.
    pub fn catalog(&self) -> &Arc<RuleCatalog> {
        &self.catalog
    }

    /// Evaluate `request` at `now`.
    ///
    /// # Errors
    ///
    /// Only request validation fails; rule problems are reported, not raised.
    pub fn detect(
        &self,
        request: &DetectAnomalyRequest,
        now: Timestamp,
    ) -> Result<DetectionReport, ValidationError> {
        request.validate()?;
        let traceability_code = TraceabilityCode::new(request.traceability_code.as_str())?;
        let snapshot = self.catalog.snapshot();
        let data = &request.product_data;
        let scope = data
            .text(&self.scope_field)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let mut candidates = snapshot.candidates(scope.as_deref());
        let mut unavailable_rules = Vec::new();
        let mut skipped = Vec::new();
        let mut out_of_scope_rules = Vec::new();

        if let Some(subset) = request.subset() {
            for code in &subset {
                if let Some(reason) = snapshot.skip_reason(code) {
                    skipped.push(SkippedRule {
                        rule_code: code.clone(),
                        reason: reason.to_string(),
                    });
                } else if snapshot.get(code).is_none() || snapshot.is_disabled(code) {
                    unavailable_rules.push(code.clone());
                } else if !candidates.iter().any(|rule| rule.code.as_str() == code) {
                    tracing::debug!(
                        rule_code = %code,
                        scope = scope.as_deref().unwrap_or(""),
                        "requested rule does not cover the product scope"
                    );
                    out_of_scope_rules.push(code.clone());
                }
            }
            candidates.retain(|rule| subset.contains(rule.code.as_str()));
        }

        let evaluator = Evaluator::new(now);
        let product_name = data
            .text(PRODUCT_NAME_FIELD)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let mut evaluated = Vec::with_capacity(candidates.len());
        let mut alerts = Vec::new();
        for rule in &candidates {
            evaluated.push(rule.code.clone());
            let evaluation = evaluator.evaluate(&rule.condition, data, true);
            tracing::debug!(
                rule_code = %rule.code,
                traceability_code = %traceability_code,
                matched = evaluation.matched,
                "rule evaluated"
            );
            if !evaluation.matched {
                continue;
            }
            let matched_fields: Vec<String> = evaluation
                .matched_fields()
                .into_iter()
                .map(str::to_string)
                .collect();
            tracing::info!(
                rule_code = %rule.code,
                traceability_code = %traceability_code,
                alert_type = %rule.alert_type,
                alert_level = %rule.alert_level,
                "anomaly detected"
            );
            alerts.push(ProposedAlert {
                traceability_code: traceability_code.clone(),
                product_name: product_name.clone(),
                alert_type: rule.alert_type,
                alert_level: rule.alert_level,
                title: rule.alert_title(),
                description: describe(rule, &matched_fields),
                status: AlertStatus::Pending,
                rule_code: rule.code.clone(),
                matched_fields,
                trace: self.include_trace.then_some(evaluation.trace),
            });
        }

        Ok(DetectionReport {
            traceability_code,
            evaluated_at: now,
            scope,
            catalog_version: snapshot.version(),
            evaluated,
            alerts,
            unavailable_rules,
            skipped,
            out_of_scope_rules,
        })
    }
}

fn describe(rule: &AlertRule, matched_fields: &[String]) -> String {
    let mut text = format!("Detected by rule {} ({})", rule.code, rule.name);
    if !matched_fields.is_empty() {
        text.push_str(&format!("; matched on {}", matched_fields.join(", ")));
    }
    if !rule.description.is_empty() {
        text.push_str(&format!(". {}", rule.description));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::RuleDefinition;
    use serde_json::json;

    fn rule(
        code: &str,
        alert_type: &str,
        condition: serde_json::Value,
        scope: &str,
    ) -> RuleDefinition {
        RuleDefinition {
            rule_code: code.to_string(),
            rule_name: format!("{alert_type} check"),
            description: String::new(),
            alert_type: alert_type.to_string(),
            alert_level: "high".to_string(),
            trigger_conditions: condition,
            detection_scope: scope.to_string(),
            ..RuleDefinition::default()
        }
    }

    fn service(defs: &[RuleDefinition]) -> DetectionService {
        let (catalog, _) = RuleCatalog::from_definitions(defs);
        DetectionService::new(Arc::new(catalog))
    }

    fn request(data: serde_json::Value) -> DetectAnomalyRequest {
        serde_json::from_value(json!({
            "traceability_code": "TRC-001",
            "product_data": data,
        }))
        .unwrap()
    }

    fn now() -> Timestamp {
        Timestamp::parse("2024-06-01T12:00:00Z").unwrap()
    }

    #[test]
    fn expired_product_raises_one_alert() {
        let svc = service(&[rule(
            "R-EXP",
            "expired",
            json!({"field": "expiry_date", "op": "lt", "value": {"now": 0}}),
            "",
        )]);
        let req = request(json!({"expiry_date": "2020-01-01", "product_name": "Yoghurt"}));
        let report = svc.detect(&req, now()).unwrap();

        assert_eq!(report.alerts.len(), 1);
        let alert = &report.alerts[0];
        assert_eq!(alert.alert_type, AlertType::Expired);
        assert_eq!(alert.status, AlertStatus::Pending);
        assert_eq!(alert.title, "expired check [R-EXP]");
        assert_eq!(alert.product_name.as_deref(), Some("Yoghurt"));
        assert_eq!(alert.matched_fields, ["expiry_date"]);
        assert!(alert.description.contains("R-EXP"));
        assert!(alert.trace.is_none());
    }

    #[test]
    fn scope_field_selects_categories() {
        let defs = [
            rule("R-COLD", "quality", json!({"field": "temp", "op": "gt", "value": 8}), "dairy"),
            rule("R-ANY", "quality", json!({"field": "temp", "op": "gt", "value": 30}), ""),
        ];
        let svc = service(&defs);

        let report = svc.detect(&request(json!({"temp": 40, "category": "Dairy"})), now()).unwrap();
        let fired: Vec<&str> = report.alerts.iter().map(|a| a.rule_code.as_str()).collect();
        assert_eq!(fired, ["R-ANY", "R-COLD"]);
        assert_eq!(report.scope.as_deref(), Some("Dairy"));

        let report = svc.detect(&request(json!({"temp": 40, "category": 7})), now()).unwrap();
        assert_eq!(report.evaluated.len(), 1);

        let svc = service(&defs).with_scope_field("segment");
        let report = svc.detect(&request(json!({"temp": 40, "segment": "dairy"})), now()).unwrap();
        assert_eq!(report.alerts.len(), 2);
    }

    #[test]
    fn subset_reports_unavailable_and_skipped_codes() {
        let mut disabled = rule("R-OFF", "quality", json!({"field": "x", "op": "exists"}), "");
        disabled.is_enabled = false;
        let broken = rule("R-BAD", "quality", json!({"field": "x", "op": "nope", "value": 1}), "");
        let svc = service(&[
            rule("R-ON", "fake", json!({"field": "x", "op": "exists"}), ""),
            rule("R-OTHER", "fake", json!({"field": "x", "op": "exists"}), ""),
            disabled,
            broken,
        ]);

        let mut req = request(json!({"x": true}));
        req.detection_rules = Some(vec![
            "R-ON".into(),
            "R-OFF".into(),
            "R-BAD".into(),
            "R-GHOST".into(),
        ]);
        let report = svc.detect(&req, now()).unwrap();

        let fired: Vec<&str> = report.alerts.iter().map(|a| a.rule_code.as_str()).collect();
        assert_eq!(fired, ["R-ON"]);
        assert_eq!(report.unavailable_rules, ["R-GHOST", "R-OFF"]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].rule_code, "R-BAD");
    }

    #[test]
    fn subset_reports_rules_outside_the_product_scope() {
        let svc = service(&[
            rule("R-DAIRY", "quality", json!({"field": "temp", "op": "gt", "value": 8}), "dairy"),
            rule("R-MEAT", "quality", json!({"field": "temp", "op": "gt", "value": 4}), "meat"),
        ]);
        let mut req = request(json!({"temp": 12, "category": "dairy"}));
        req.detection_rules = Some(vec!["R-DAIRY".into(), "R-MEAT".into()]);
        let report = svc.detect(&req, now()).unwrap();

        let fired: Vec<&str> = report.alerts.iter().map(|a| a.rule_code.as_str()).collect();
        assert_eq!(fired, ["R-DAIRY"]);
        assert_eq!(report.out_of_scope_rules, ["R-MEAT"]);
        assert!(report.unavailable_rules.is_empty());

        req.product_data = ProductData::new().with("temp", 12.0);
        let report = svc.detect(&req, now()).unwrap();
        assert!(report.alerts.is_empty());
        assert_eq!(report.out_of_scope_rules, ["R-DAIRY", "R-MEAT"]);
    }

    #[test]
    fn empty_subset_means_no_restriction() {
        let svc = service(&[rule("R-1", "other", json!({"field": "x", "op": "exists"}), "")]);
        let mut req = request(json!({"x": 1}));
        req.detection_rules = Some(Vec::new());
        assert_eq!(svc.detect(&req, now()).unwrap().alerts.len(), 1);
    }

    #[test]
    fn detection_is_deterministic() {
        let svc = service(&[
            rule("R-B", "quality", json!({"field": "grade", "op": "in", "value": ["C", "D"]}), ""),
            rule("R-A", "fake", json!({"field": "hologram", "op": "absent"}), ""),
        ])
        .with_trace(true);
        let req = request(json!({"grade": "C"}));
        let first = svc.detect(&req, now()).unwrap();
        let second = svc.detect(&req, now()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.alerts[0].rule_code.as_str(), "R-A");
        assert!(first.alerts[0].trace.is_some());
    }

    #[test]
    fn blank_traceability_code_is_rejected() {
        let svc = service(&[]);
        let mut req = request(json!({}));
        req.traceability_code = "  ".into();
        let err = svc.detect(&req, now()).unwrap_err();
        assert_eq!(err.field, "traceability_code");
    }
}
