//! # Trigger Conditions
//!
//! A rule's trigger condition is stored as JSON text and parsed once, at rule
//! load, into a [`Condition`] tree. Evaluation never re-parses.
//!
//! ## Serialized Form
//!
//! ```json
//! {"and": [
//!   {"field": "expiry_date", "op": "lt", "value": {"now": 0}},
//!   {"or": [
//!     {"field": "storage_temp", "op": "gt", "value": 8},
//!     {"field": "seal_intact", "op": "eq", "value": false}
//!   ]},
//!   {"not": {"field": "disposition", "op": "in", "value": ["destroyed", "returned"]}}
//! ]}
//! ```
//!
//! A node is exactly one of `and` (non-empty array), `or` (non-empty array),
//! `not` (object) or a leaf with `field` and `op`. Leaf operands are a scalar
//! literal, an array for `in`, nothing for `exists`/`absent`, or the
//! clock-relative `{"now": <days>}` for ordering operators.

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::ConditionError;
use crate::value::FieldValue;

/// Deepest accepted nesting of combinators.
pub const MAX_CONDITION_DEPTH: usize = 32;

// ─── Operator ────────────────────────────────────────────────────────

/// Leaf comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Text containment.
    Contains,
    /// Membership in a literal set.
    In,
    /// Key is present.
    Exists,
    /// Key is not present.
    Absent,
}

impl Operator {
    /// Canonical operator name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Contains => "contains",
            Self::In => "in",
            Self::Exists => "exists",
            Self::Absent => "absent",
        }
    }

    /// Whether this operator orders its operands.
    pub fn is_ordering(&self) -> bool {
        matches!(self, Self::Gt | Self::Gte | Self::Lt | Self::Lte)
    }

    /// Whether this operator inspects only key presence.
    pub fn is_presence(&self) -> bool {
        matches!(self, Self::Exists | Self::Absent)
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = String;

    /// Canonical names plus the symbolic spellings rule authors tend to use.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eq" | "==" | "=" => Ok(Self::Eq),
            "ne" | "!=" => Ok(Self::Ne),
            "gt" | ">" => Ok(Self::Gt),
            "gte" | ">=" => Ok(Self::Gte),
            "lt" | "<" => Ok(Self::Lt),
            "lte" | "<=" => Ok(Self::Lte),
            "contains" => Ok(Self::Contains),
            "in" | "in_set" => Ok(Self::In),
            "exists" => Ok(Self::Exists),
            "absent" | "not_exists" => Ok(Self::Absent),
            other => Err(format!("unknown operator {other:?}")),
        }
    }
}

// ─── Operand ─────────────────────────────────────────────────────────

/// Right-hand side of a leaf comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand (`exists`, `absent`).
    None,
    /// A scalar literal.
    Literal(FieldValue),
    /// A literal set (`in`).
    Set(Vec<FieldValue>),
    /// Evaluation time shifted by a number of days.
    Now {
        /// Day offset; negative values reach into the past.
        offset_days: i64,
    },
}

impl Operand {
    fn to_json(&self) -> Option<Value> {
        match self {
            Self::None => None,
            Self::Literal(v) => Some(v.to_json()),
            Self::Set(items) => Some(Value::Array(items.iter().map(FieldValue::to_json).collect())),
            Self::Now { offset_days } => Some(json!({ "now": offset_days })),
        }
    }
}

// ─── Comparison / Condition ──────────────────────────────────────────

/// A leaf comparison of one product field.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    /// Product data field name.
    pub field: String,
    /// Operator.
    pub op: Operator,
    /// Right-hand side.
    pub operand: Operand,
}

/// A parsed trigger condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Leaf comparison.
    Compare(Comparison),
    /// All children match.
    And(Vec<Condition>),
    /// At least one child matches.
    Or(Vec<Condition>),
    /// The child does not match.
    Not(Box<Condition>),
}

impl Condition {
    /// Leaf constructor.
    pub fn compare(field: impl Into<String>, op: Operator, operand: Operand) -> Self {
        Self::Compare(Comparison {
            field: field.into(),
            op,
            operand,
        })
    }

    /// Parse condition text (JSON).
    pub fn parse_str(text: &str) -> Result<Self, ConditionError> {
        let value: Value = serde_json::from_str(text)?;
        Self::parse(&value)
    }

    /// Parse an already-decoded JSON value.
    pub fn parse(value: &Value) -> Result<Self, ConditionError> {
        parse_node(value, "$", 0)
    }

    /// Serialize back to the JSON form accepted by [`Condition::parse`].
    pub fn to_json(&self) -> Value {
        match self {
            Self::Compare(c) => {
                let mut obj = Map::new();
                obj.insert("field".into(), Value::String(c.field.clone()));
                obj.insert("op".into(), Value::String(c.op.as_str().into()));
                if let Some(v) = c.operand.to_json() {
                    obj.insert("value".into(), v);
                }
                Value::Object(obj)
            }
            Self::And(children) => {
                json!({ "and": children.iter().map(Self::to_json).collect::<Vec<_>>() })
            }
            Self::Or(children) => {
                json!({ "or": children.iter().map(Self::to_json).collect::<Vec<_>>() })
            }
            Self::Not(child) => json!({ "not": child.to_json() }),
        }
    }

    /// Number of leaf comparisons.
    pub fn leaf_count(&self) -> usize {
        match self {
            Self::Compare(_) => 1,
            Self::And(cs) | Self::Or(cs) => cs.iter().map(Self::leaf_count).sum(),
            Self::Not(c) => c.leaf_count(),
        }
    }

    /// Nesting depth; a bare leaf has depth 1.
    pub fn depth(&self) -> usize {
        match self {
            Self::Compare(_) => 1,
            Self::And(cs) | Self::Or(cs) => 1 + cs.iter().map(Self::depth).max().unwrap_or(0),
            Self::Not(c) => 1 + c.depth(),
        }
    }

    /// Every product field the condition reads.
    pub fn fields(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Self::Compare(c) => {
                out.insert(c.field.as_str());
            }
            Self::And(cs) | Self::Or(cs) => cs.iter().for_each(|c| c.collect_fields(out)),
            Self::Not(c) => c.collect_fields(out),
        }
    }
}

impl FromStr for Condition {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s)
    }
}

impl Serialize for Condition {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::parse(&value).map_err(serde::de::Error::custom)
    }
}

// ─── Parser ──────────────────────────────────────────────────────────

fn parse_node(value: &Value, path: &str, depth: usize) -> Result<Condition, ConditionError> {
    if depth >= MAX_CONDITION_DEPTH {
        return Err(ConditionError::TooDeep {
            path: path.to_string(),
            max: MAX_CONDITION_DEPTH,
        });
    }
    let obj = value
        .as_object()
        .ok_or_else(|| ConditionError::malformed(path, "condition node must be an object"))?;

    if obj.contains_key("field") {
        return parse_leaf(obj, path).map(Condition::Compare);
    }
    if obj.len() != 1 {
        return Err(ConditionError::malformed(
            path,
            "combinator node must have exactly one of `and`, `or`, `not`",
        ));
    }
    // Single-key object: the key selects the combinator.
    let (key, inner) = match obj.iter().next() {
        Some(entry) => entry,
        None => return Err(ConditionError::malformed(path, "empty condition node")),
    };
    match key.as_str() {
        "and" | "or" => {
            let items = inner.as_array().ok_or_else(|| {
                ConditionError::malformed(path, format!("`{key}` expects an array"))
            })?;
            if items.is_empty() {
                return Err(ConditionError::malformed(path, format!("`{key}` must not be empty")));
            }
            let children = items
                .iter()
                .enumerate()
                .map(|(i, item)| parse_node(item, &format!("{path}.{key}[{i}]"), depth + 1))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(if key == "and" {
                Condition::And(children)
            } else {
                Condition::Or(children)
            })
        }
        "not" => {
            let child = parse_node(inner, &format!("{path}.not"), depth + 1)?;
            Ok(Condition::Not(Box::new(child)))
        }
        other => Err(ConditionError::malformed(
            path,
            format!("unknown condition key {other:?}"),
        )),
    }
}

fn parse_leaf(obj: &Map<String, Value>, path: &str) -> Result<Comparison, ConditionError> {
    if let Some(unknown) = obj
        .keys()
        .find(|k| !matches!(k.as_str(), "field" | "op" | "value"))
    {
        return Err(ConditionError::malformed(
            path,
            format!("unknown leaf key {unknown:?}"),
        ));
    }

    let field = obj
        .get("field")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .ok_or_else(|| ConditionError::malformed(path, "`field` must be a non-empty string"))?;

    let op: Operator = obj
        .get("op")
        .and_then(Value::as_str)
        .ok_or_else(|| ConditionError::malformed(path, "`op` must be a string"))?
        .parse()
        .map_err(|reason: String| ConditionError::malformed(path, reason))?;

    let raw = obj.get("value");
    let operand = parse_operand(op, raw, path)?;

    Ok(Comparison {
        field: field.to_string(),
        op,
        operand,
    })
}

fn parse_operand(op: Operator, raw: Option<&Value>, path: &str) -> Result<Operand, ConditionError> {
    if op.is_presence() {
        return match raw {
            None | Some(Value::Null) => Ok(Operand::None),
            Some(_) => Err(ConditionError::malformed(
                path,
                format!("`{op}` does not take a value"),
            )),
        };
    }

    let raw =
        raw.ok_or_else(|| ConditionError::malformed(path, format!("`{op}` requires a value")))?;

    match op {
        Operator::In => {
            let items = raw.as_array().ok_or_else(|| {
                ConditionError::malformed(path, "`in` requires an array value")
            })?;
            if items.is_empty() {
                return Err(ConditionError::malformed(path, "`in` set must not be empty"));
            }
            items
                .iter()
                .map(|item| parse_scalar(item, path))
                .collect::<Result<Vec<_>, _>>()
                .map(Operand::Set)
        }
        Operator::Contains => match raw {
            Value::String(s) => Ok(Operand::Literal(FieldValue::Text(s.clone()))),
            _ => Err(ConditionError::malformed(path, "`contains` requires a text value")),
        },
        _ if op.is_ordering() => match parse_now(raw, path)? {
            Some(now) => Ok(now),
            None => parse_scalar(raw, path).map(Operand::Literal),
        },
        _ => {
            if parse_now(raw, path)?.is_some() {
                return Err(ConditionError::malformed(
                    path,
                    format!("`now` is only valid with ordering operators, not `{op}`"),
                ));
            }
            parse_scalar(raw, path).map(Operand::Literal)
        }
    }
}

fn parse_now(raw: &Value, path: &str) -> Result<Option<Operand>, ConditionError> {
    let Some(obj) = raw.as_object() else {
        return Ok(None);
    };
    let Some(offset) = obj.get("now") else {
        return Ok(None);
    };
    if obj.len() != 1 {
        return Err(ConditionError::malformed(path, "`now` operand takes no other keys"));
    }
    let offset_days = match offset {
        Value::Null => 0,
        Value::Number(n) => n.as_i64().ok_or_else(|| {
            ConditionError::malformed(path, "`now` offset must be a whole number of days")
        })?,
        _ => {
            return Err(ConditionError::malformed(
                path,
                "`now` offset must be a number of days or null",
            ))
        }
    };
    Ok(Some(Operand::Now { offset_days }))
}

fn parse_scalar(raw: &Value, path: &str) -> Result<FieldValue, ConditionError> {
    match raw {
        Value::Number(_) | Value::String(_) | Value::Bool(_) => Ok(FieldValue::from_json(raw)),
        Value::Null => Err(ConditionError::malformed(
            path,
            "null is not a comparable value; use `exists` or `absent`",
        )),
        Value::Array(_) | Value::Object(_) => Err(ConditionError::malformed(
            path,
            "expected a number, text or boolean value",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_tree() {
        let cond = Condition::parse_str(
            r#"{"and": [
                {"field": "expiry_date", "op": "lt", "value": {"now": 0}},
                {"or": [
                    {"field": "storage_temp", "op": ">", "value": 8},
                    {"field": "seal_intact", "op": "eq", "value": false}
                ]},
                {"not": {"field": "disposition", "op": "in", "value": ["destroyed", "returned"]}}
            ]}"#,
        )
        .unwrap();

        assert_eq!(cond.leaf_count(), 4);
        assert_eq!(cond.depth(), 3);
        let fields: Vec<&str> = cond.fields().into_iter().collect();
        assert_eq!(fields, ["disposition", "expiry_date", "seal_intact", "storage_temp"]);
    }

    #[test]
    fn round_trips_through_json() {
        let value = json!({"or": [
            {"field": "lab_result", "op": "contains", "value": "salmonella"},
            {"field": "recall_flag", "op": "exists"}
        ]});
        let cond = Condition::parse(&value).unwrap();
        let again = Condition::parse(&cond.to_json()).unwrap();
        assert_eq!(cond, again);
    }

    #[test]
    fn now_operand_defaults_to_zero_offset() {
        let cond =
            Condition::parse_str(r#"{"field":"expiry_date","op":"lte","value":{"now":null}}"#)
                .unwrap();
        match cond {
            Condition::Compare(c) => assert_eq!(c.operand, Operand::Now { offset_days: 0 }),
            other => panic!("expected leaf, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_operator_with_path() {
        let err = Condition::parse(&json!({"and": [
            {"field": "a", "op": "eq", "value": 1},
            {"field": "b", "op": "like", "value": "x"}
        ]}))
        .unwrap_err();
        match err {
            ConditionError::Malformed { path, reason } => {
                assert_eq!(path, "$.and[1]");
                assert!(reason.contains("like"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn rejects_structural_mistakes() {
        let cases = [
            r#"{"and": []}"#,
            r#"{"or": {"field":"a","op":"eq","value":1}}"#,
            r#"{"field":"a","op":"in","value":"x"}"#,
            r#"{"field":"a","op":"in","value":[]}"#,
            r#"{"field":"a","op":"exists","value":1}"#,
            r#"{"field":"a","op":"eq"}"#,
            r#"{"field":"a","op":"eq","value":null}"#,
            r#"{"field":"a","op":"eq","value":{"now":0}}"#,
            r#"{"field":"a","op":"contains","value":3}"#,
            r#"{"field":"","op":"eq","value":1}"#,
            r#"{"field":"a","op":"eq","value":1,"weight":2}"#,
            r#"{"xor": []}"#,
            r#"[1,2]"#,
        ];
        for case in cases {
            assert!(Condition::parse_str(case).is_err(), "accepted {case}");
        }
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(matches!(
            Condition::parse_str("{not json"),
            Err(ConditionError::Json(_))
        ));
    }

    #[test]
    fn rejects_excessive_depth() {
        let mut value = json!({"field": "a", "op": "exists"});
        for _ in 0..MAX_CONDITION_DEPTH {
            value = json!({ "not": value });
        }
        assert!(matches!(
            Condition::parse(&value),
            Err(ConditionError::TooDeep { .. })
        ));
    }

    #[test]
    fn symbolic_operators_normalise() {
        let cond = Condition::parse_str(r#"{"field":"qty","op":">=","value":10}"#).unwrap();
        assert_eq!(cond.to_json()["op"], "gte");
    }
}
