//! Shared fixtures for the cross-crate tests under `tests/`.

use std::sync::Arc;

use safetrace_core::{AlertLevel, FixedClock, SequenceCodeGenerator, Timestamp};
use safetrace_engine::{EngineConfig, Orchestrator};
use safetrace_rules::{DetectAnomalyRequest, RuleDefinition};
use safetrace_state::{ApproveRecallRequest, CreateRecallRequest, RecordProcessRequest};
use serde_json::{json, Value};

/// Instant every fixture engine starts at.
pub const START: &str = "2024-06-01T08:00:00Z";

/// Rules used across scenarios: expiry, contamination (dairy only) and a
/// disabled grade check.
pub fn standard_rules() -> Vec<RuleDefinition> {
    vec![
        rule(
            "R-EXP",
            "Expired",
            "expired",
            "high",
            json!({"field": "expiry_date", "op": "lt", "value": {"now": 0}}),
            "",
        ),
        rule(
            "R-LISTERIA",
            "Listeria",
            "contaminated",
            "critical",
            json!({"and": [
                {"field": "listeria_cfu", "op": "gt", "value": 100},
                {"field": "lab_verified", "op": "eq", "value": true}
            ]}),
            "dairy",
        ),
        RuleDefinition {
            is_enabled: false,
            ..rule(
                "R-GRADE",
                "Grade C",
                "quality",
                "low",
                json!({"field": "grade", "op": "eq", "value": "C"}),
                "",
            )
        },
    ]
}

/// A rule definition with the given trigger condition.
pub fn rule(
    code: &str,
    name: &str,
    alert_type: &str,
    level: &str,
    condition: Value,
    scope: &str,
) -> RuleDefinition {
    RuleDefinition {
        rule_code: code.to_string(),
        rule_name: name.to_string(),
        alert_type: alert_type.to_string(),
        alert_level: level.to_string(),
        trigger_conditions: condition,
        detection_scope: scope.to_string(),
        ..RuleDefinition::default()
    }
}

/// An orchestrator on a fixed clock at [`START`] with the standard rules.
pub fn engine() -> (Arc<FixedClock>, Orchestrator) {
    engine_with(EngineConfig::default())
}

/// Like [`engine`] with a custom configuration.
pub fn engine_with(config: EngineConfig) -> (Arc<FixedClock>, Orchestrator) {
    let clock = Arc::new(FixedClock::new(at(START)));
    let codes =
        SequenceCodeGenerator::new(config.alert_prefix.clone(), config.recall_prefix.clone());
    let engine = Orchestrator::new(config, clock.clone(), Arc::new(codes));
    engine.reload_rules(&standard_rules());
    (clock, engine)
}

/// Parse a fixture timestamp.
pub fn at(raw: &str) -> Timestamp {
    Timestamp::parse_lenient(raw).unwrap_or_else(|e| panic!("fixture timestamp {raw:?}: {e}"))
}

/// A detection request for `traceability_code` with `product_data`.
pub fn detect_request(traceability_code: &str, product_data: Value) -> DetectAnomalyRequest {
    serde_json::from_value(json!({
        "traceability_code": traceability_code,
        "product_data": product_data,
    }))
    .unwrap_or_else(|e| panic!("fixture request: {e}"))
}

/// A recall request for `traceability_code`.
pub fn recall_request(traceability_code: &str, affected: Option<i64>) -> CreateRecallRequest {
    CreateRecallRequest {
        traceability_code: traceability_code.to_string(),
        product_name: None,
        alert_code: None,
        batch_number: Some("B-2024-06".to_string()),
        recall_reason: "Safety anomaly confirmed".to_string(),
        recall_level: AlertLevel::High,
        recall_scope: "All regional outlets".to_string(),
        recall_instructions: "Remove from sale and return to depot".to_string(),
        public_notice: None,
        affected_quantity: affected,
    }
}

/// An approval by the safety director.
pub fn approval() -> ApproveRecallRequest {
    ApproveRecallRequest {
        approved_by: "safety-director".to_string(),
        approval_comment: Some("approved".to_string()),
    }
}

/// A retrieval of `quantity` items.
pub fn retrieval(quantity: i64) -> RecordProcessRequest {
    RecordProcessRequest {
        process_type: "retrieval".to_string(),
        description: None,
        processed_by: "field-7".to_string(),
        processed_by_name: "Field team 7".to_string(),
        processed_quantity: quantity,
        location: "Depot North".to_string(),
        evidence_images: None,
    }
}
