//! # Alert Rules
//!
//! [`RuleDefinition`] is the loosely typed shape rules arrive in (a rule
//! file, an admin API, a database row). [`AlertRule::compile`] validates it
//! and parses the trigger condition once; detection only ever sees compiled
//! rules.

use safetrace_core::{
    require_non_blank, AlertLevel, AlertType, RuleCode, Timestamp, ValidationError,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::condition::Condition;
use crate::error::RuleError;

fn default_enabled() -> bool {
    true
}

/// A rule as authored. Every field is kept loose so that one bad rule is
/// reported on its own instead of failing the whole file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    /// Unique rule code.
    #[serde(default)]
    pub rule_code: String,
    /// Human-readable name.
    #[serde(default)]
    pub rule_name: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Alert type raised on a match.
    #[serde(default)]
    pub alert_type: String,
    /// Alert level raised on a match.
    #[serde(default)]
    pub alert_level: String,
    /// Trigger condition: JSON text, or the condition inline.
    #[serde(default)]
    pub trigger_conditions: Value,
    /// Comma-separated categories; empty or `*` for all.
    #[serde(default)]
    pub detection_scope: String,
    /// Disabled rules are never evaluated.
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
    /// Author.
    #[serde(default)]
    pub created_by: String,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
    /// Last modification time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
}

impl Default for RuleDefinition {
    fn default() -> Self {
        Self {
            rule_code: String::new(),
            rule_name: String::new(),
            description: String::new(),
            alert_type: String::new(),
            alert_level: String::new(),
            trigger_conditions: Value::Null,
            detection_scope: String::new(),
            is_enabled: default_enabled(),
            created_by: String::new(),
            created_at: None,
            updated_at: None,
        }
    }
}

/// Rule file document: `{rules: [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Rule definitions in file order.
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

// ─── Detection Scope ─────────────────────────────────────────────────

/// Which product categories a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionScope {
    /// Every category, and products without one.
    Global,
    /// Only the listed categories, normalised to trimmed lowercase.
    Categories(Vec<String>),
}

impl DetectionScope {
    /// Parse a comma-separated category list.
    pub fn parse(raw: &str) -> Self {
        let mut categories: Vec<String> = raw
            .split(',')
            .map(normalize_category)
            .filter(|c| !c.is_empty())
            .collect();
        if categories.is_empty() || categories.iter().any(|c| c == "*") {
            return Self::Global;
        }
        categories.sort();
        categories.dedup();
        Self::Categories(categories)
    }

    /// Whether this is the global scope.
    pub fn is_global(&self) -> bool {
        matches!(self, Self::Global)
    }

    /// Whether a product in `category` is in scope.
    pub fn covers(&self, category: Option<&str>) -> bool {
        match (self, category) {
            (Self::Global, _) => true,
            (Self::Categories(cats), Some(c)) => {
                let c = normalize_category(c);
                cats.iter().any(|x| *x == c)
            }
            (Self::Categories(_), None) => false,
        }
    }
}

impl std::fmt::Display for DetectionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => f.write_str("*"),
            Self::Categories(cats) => f.write_str(&cats.join(",")),
        }
    }
}

/// Scope keys compare case-insensitively after trimming.
pub fn normalize_category(raw: &str) -> String {
    raw.trim().to_lowercase()
}

// ─── Compiled Rule ───────────────────────────────────────────────────

/// A validated rule with its condition parsed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRule {
    /// Unique rule code.
    pub code: RuleCode,
    /// Human-readable name.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// Alert type raised on a match.
    pub alert_type: AlertType,
    /// Alert level raised on a match.
    pub alert_level: AlertLevel,
    /// Parsed trigger condition.
    pub condition: Condition,
    /// Condition text as authored, kept for audit.
    pub condition_source: String,
    /// Categories the rule applies to.
    pub scope: DetectionScope,
    /// Enabled flag.
    pub enabled: bool,
    /// Author.
    pub created_by: String,
    /// Creation time.
    pub created_at: Option<Timestamp>,
    /// Last modification time.
    pub updated_at: Option<Timestamp>,
}

impl AlertRule {
    /// Validate a definition and parse its condition.
    ///
    /// # Errors
    ///
    /// [`RuleError::Validation`] for a bad code, blank name or unknown
    /// type/level; [`RuleError::Condition`] for a missing or malformed
    /// trigger condition.
    pub fn compile(def: &RuleDefinition) -> Result<Self, RuleError> {
        let code = RuleCode::new(def.rule_code.as_str())?;
        require_non_blank("rule_name", &def.rule_name)?;
        let alert_type: AlertType = def.alert_type.trim().parse()?;
        let alert_level: AlertLevel = def.alert_level.trim().parse()?;

        let (condition, condition_source) = match &def.trigger_conditions {
            Value::String(text) => (Condition::parse_str(text)?, text.clone()),
            Value::Null => {
                return Err(ValidationError::missing("trigger_conditions").into());
            }
            inline => (Condition::parse(inline)?, inline.to_string()),
        };

        Ok(Self {
            code,
            name: def.rule_name.trim().to_string(),
            description: def.description.trim().to_string(),
            alert_type,
            alert_level,
            condition,
            condition_source,
            scope: DetectionScope::parse(&def.detection_scope),
            enabled: def.is_enabled,
            created_by: def.created_by.clone(),
            created_at: def.created_at,
            updated_at: def.updated_at,
        })
    }

    /// Alert title for a match: `"<rule name> [<rule code>]"`.
    pub fn alert_title(&self) -> String {
        format!("{} [{}]", self.name, self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConditionError;
    use serde_json::json;

    fn definition() -> RuleDefinition {
        serde_json::from_value(json!({
            "rule_code": "R-EXP-001",
            "rule_name": "Expired product",
            "description": "Product is past its expiry date",
            "alert_type": "expired",
            "alert_level": "high",
            "trigger_conditions": "{\"field\":\"expiry_date\",\"op\":\"lt\",\"value\":{\"now\":0}}",
            "detection_scope": " Dairy, meat ",
            "created_by": "qa-team"
        }))
        .unwrap()
    }

    #[test]
    fn compiles_text_condition() {
        let rule = AlertRule::compile(&definition()).unwrap();
        assert_eq!(rule.code.as_str(), "R-EXP-001");
        assert_eq!(rule.alert_type, AlertType::Expired);
        assert_eq!(rule.alert_level, AlertLevel::High);
        assert!(rule.enabled);
        assert_eq!(
            rule.scope,
            DetectionScope::Categories(vec!["dairy".into(), "meat".into()])
        );
        assert_eq!(rule.alert_title(), "Expired product [R-EXP-001]");
        assert!(rule.condition_source.contains("expiry_date"));
    }

    #[test]
    fn compiles_inline_condition() {
        let mut def = definition();
        def.trigger_conditions = json!({"field": "seal_intact", "op": "eq", "value": false});
        let rule = AlertRule::compile(&def).unwrap();
        assert_eq!(rule.condition.leaf_count(), 1);
    }

    #[test]
    fn rejects_bad_definitions() {
        let mut def = definition();
        def.alert_level = "urgent".into();
        assert!(matches!(AlertRule::compile(&def), Err(RuleError::Validation(_))));

        let mut def = definition();
        def.rule_name = "  ".into();
        assert!(matches!(AlertRule::compile(&def), Err(RuleError::Validation(_))));

        let mut def = definition();
        def.trigger_conditions = Value::Null;
        assert!(matches!(AlertRule::compile(&def), Err(RuleError::Validation(_))));

        let mut def = definition();
        def.trigger_conditions = json!("{\"and\": []}");
        assert!(matches!(
            AlertRule::compile(&def),
            Err(RuleError::Condition(ConditionError::Malformed { .. }))
        ));
    }

    #[test]
    fn scope_parsing() {
        assert_eq!(DetectionScope::parse(""), DetectionScope::Global);
        assert_eq!(DetectionScope::parse(" * "), DetectionScope::Global);
        assert_eq!(DetectionScope::parse("dairy,*"), DetectionScope::Global);
        let scope = DetectionScope::parse("Frozen, frozen ,produce");
        assert_eq!(scope.to_string(), "frozen,produce");
        assert!(scope.covers(Some("  PRODUCE")));
        assert!(!scope.covers(Some("bakery")));
        assert!(!scope.covers(None));
        assert!(DetectionScope::Global.covers(None));
    }

    #[test]
    fn enabled_defaults_to_true() {
        let def: RuleDefinition = serde_json::from_value(json!({"rule_code": "R-1"})).unwrap();
        assert!(def.is_enabled);
    }
}
