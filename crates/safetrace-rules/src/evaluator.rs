//! # Condition Evaluator
//!
//! Evaluates a parsed [`Condition`] against [`ProductData`] at a fixed
//! evaluation instant. Evaluation is total: a missing field or a type
//! mismatch is a non-match, never an error, and the same inputs always give
//! the same answer.
//!
//! `and`/`or` short-circuit. When a trace is requested, every leaf that was
//! actually evaluated is recorded with its node path and, for non-matches,
//! the reason.

use std::cmp::Ordering;

use safetrace_core::Timestamp;
use serde::{Deserialize, Serialize};

use crate::condition::{Comparison, Condition, Operand, Operator};
use crate::value::{FieldValue, ProductData};

/// Why a leaf did not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchReason {
    /// The field is not present in the product data.
    MissingField,
    /// Field and operand cannot be compared.
    TypeMismatch,
    /// Comparable, but the comparison is false.
    ValueMismatch,
}

/// Audit record for one evaluated leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafTrace {
    /// JSON path of the leaf inside the condition (`$.and[0]`).
    pub path: String,
    /// Product field the leaf reads.
    pub field: String,
    /// Operator applied.
    pub op: Operator,
    /// Whether the leaf comparison held.
    pub matched: bool,
    /// Why it did not hold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<MismatchReason>,
}

/// Outcome of evaluating a condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Whether the whole condition matched.
    pub matched: bool,
    /// Evaluated leaves, in evaluation order. Empty unless requested.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<LeafTrace>,
}

impl Evaluation {
    /// Fields of the leaves that matched.
    pub fn matched_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = self
            .trace
            .iter()
            .filter(|t| t.matched)
            .map(|t| t.field.as_str())
            .collect();
        fields.sort_unstable();
        fields.dedup();
        fields
    }
}

/// Condition evaluator bound to an evaluation instant.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator {
    now: Timestamp,
}

impl Evaluator {
    /// Evaluator resolving `{"now": ...}` operands against `now`.
    pub fn new(now: Timestamp) -> Self {
        Self { now }
    }

    /// The evaluation instant.
    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Whether `condition` matches `data`.
    pub fn matches(&self, condition: &Condition, data: &ProductData) -> bool {
        let mut path = String::from("$");
        self.eval_node(condition, data, &mut path, None)
    }

    /// Evaluate, optionally collecting the leaf trace.
    pub fn evaluate(
        &self,
        condition: &Condition,
        data: &ProductData,
        with_trace: bool,
    ) -> Evaluation {
        let mut path = String::from("$");
        if !with_trace {
            let matched = self.eval_node(condition, data, &mut path, None);
            return Evaluation {
                matched,
                trace: Vec::new(),
            };
        }
        let mut trace = Vec::new();
        let matched = self.eval_node(condition, data, &mut path, Some(&mut trace));
        Evaluation { matched, trace }
    }

    fn eval_node(
        &self,
        node: &Condition,
        data: &ProductData,
        path: &mut String,
        mut trace: Option<&mut Vec<LeafTrace>>,
    ) -> bool {
        match node {
            Condition::Compare(cmp) => {
                let outcome = self.compare(cmp, data);
                if let Some(trace) = trace {
                    trace.push(LeafTrace {
                        path: path.clone(),
                        field: cmp.field.clone(),
                        op: cmp.op,
                        matched: outcome.is_ok(),
                        reason: outcome.err(),
                    });
                }
                outcome.is_ok()
            }
            Condition::And(children) => {
                for (i, child) in children.iter().enumerate() {
                    let len = path.len();
                    path.push_str(&format!(".and[{i}]"));
                    let ok = self.eval_node(child, data, path, trace.as_deref_mut());
                    path.truncate(len);
                    if !ok {
                        return false;
                    }
                }
                true
            }
            Condition::Or(children) => {
                for (i, child) in children.iter().enumerate() {
                    let len = path.len();
                    path.push_str(&format!(".or[{i}]"));
                    let ok = self.eval_node(child, data, path, trace.as_deref_mut());
                    path.truncate(len);
                    if ok {
                        return true;
                    }
                }
                false
            }
            Condition::Not(child) => {
                let len = path.len();
                path.push_str(".not");
                let ok = self.eval_node(child, data, path, trace);
                path.truncate(len);
                !ok
            }
        }
    }

    /// `Ok(())` on a match, otherwise the reason it failed.
    fn compare(&self, cmp: &Comparison, data: &ProductData) -> Result<(), MismatchReason> {
        match cmp.op {
            Operator::Exists => {
                return holds(data.contains(&cmp.field));
            }
            Operator::Absent => {
                return holds(!data.contains(&cmp.field));
            }
            _ => {}
        }

        let field = data.get(&cmp.field).ok_or(MismatchReason::MissingField)?;

        match (cmp.op, &cmp.operand) {
            (Operator::Eq, Operand::Literal(lit)) => holds(same_variant_eq(field, lit)?),
            (Operator::Ne, Operand::Literal(lit)) => holds(!same_variant_eq(field, lit)?),
            (Operator::In, Operand::Set(items)) => {
                let mut comparable = false;
                for item in items {
                    if let Ok(eq) = same_variant_eq(field, item) {
                        comparable = true;
                        if eq {
                            return Ok(());
                        }
                    }
                }
                if comparable {
                    Err(MismatchReason::ValueMismatch)
                } else {
                    Err(MismatchReason::TypeMismatch)
                }
            }
            (Operator::Contains, Operand::Literal(FieldValue::Text(needle))) => match field {
                FieldValue::Text(hay) => holds(hay.contains(needle.as_str())),
                _ => Err(MismatchReason::TypeMismatch),
            },
            (op, operand) if op.is_ordering() => {
                let ord = self.order(field, operand)?;
                holds(match op {
                    Operator::Gt => ord == Ordering::Greater,
                    Operator::Gte => ord != Ordering::Less,
                    Operator::Lt => ord == Ordering::Less,
                    _ => ord != Ordering::Greater,
                })
            }
            // Operand shapes the parser never produces for this operator.
            _ => Err(MismatchReason::TypeMismatch),
        }
    }

    /// Order the field against an ordering operand.
    fn order(&self, field: &FieldValue, operand: &Operand) -> Result<Ordering, MismatchReason> {
        match operand {
            Operand::Now { offset_days } => {
                let rhs = self.now.plus_days(*offset_days);
                let lhs = field.as_instant().ok_or(MismatchReason::TypeMismatch)?;
                Ok(lhs.cmp(&rhs))
            }
            Operand::Literal(FieldValue::Number(rhs)) => {
                let lhs = field.as_number().ok_or(MismatchReason::TypeMismatch)?;
                // NaN is comparable to nothing.
                lhs.partial_cmp(rhs).ok_or(MismatchReason::ValueMismatch)
            }
            Operand::Literal(rhs @ FieldValue::Text(_)) => {
                let rhs = rhs.as_instant().ok_or(MismatchReason::TypeMismatch)?;
                let lhs = field.as_instant().ok_or(MismatchReason::TypeMismatch)?;
                Ok(lhs.cmp(&rhs))
            }
            _ => Err(MismatchReason::TypeMismatch),
        }
    }
}

fn holds(ok: bool) -> Result<(), MismatchReason> {
    if ok {
        Ok(())
    } else {
        Err(MismatchReason::ValueMismatch)
    }
}

/// Equality between values of the same variant; mixed variants are not comparable.
fn same_variant_eq(field: &FieldValue, lit: &FieldValue) -> Result<bool, MismatchReason> {
    match (field, lit) {
        (FieldValue::Number(a), FieldValue::Number(b)) => Ok(a == b),
        (FieldValue::Text(a), FieldValue::Text(b)) => Ok(a == b),
        (FieldValue::Bool(a), FieldValue::Bool(b)) => Ok(a == b),
        _ => Err(MismatchReason::TypeMismatch),
    }
}
