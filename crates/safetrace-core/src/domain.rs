//! # Alert and Recall Enumerations
//!
//! The four closed string domains of the alert/recall model. Their lowercase
//! string values are contracts: transport layers, persisted records and rule
//! files all switch on them, so `as_str()`, serde and `FromStr` agree exactly.
//!
//! The status enums also own their transition tables. The state machines in
//! `safetrace-state` consult `valid_transitions()` before any guard runs, so a
//! pair missing from the table is rejected without touching the entity.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ValidationError;

// ─── Alert Type ──────────────────────────────────────────────────────

/// Classification of a product-safety anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    /// Quality defect.
    Quality,
    /// Product past its expiry date.
    Expired,
    /// Contamination detected.
    Contaminated,
    /// Counterfeit product.
    Fake,
    /// Voluntary recall notice.
    Recall,
    /// Anything else.
    Other,
}

impl AlertType {
    /// All alert types.
    pub fn all() -> &'static [AlertType] {
        &[
            Self::Quality,
            Self::Expired,
            Self::Contaminated,
            Self::Fake,
            Self::Recall,
            Self::Other,
        ]
    }

    /// The canonical string value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quality => "quality",
            Self::Expired => "expired",
            Self::Contaminated => "contaminated",
            Self::Fake => "fake",
            Self::Recall => "recall",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ValidationError::new("alert_type", format!("unknown alert type {s:?}")))
    }
}

// ─── Alert Level ─────────────────────────────────────────────────────

/// Severity of an alert, also used as the recall level.
///
/// Variants are declared in ascending severity so the derived `Ord` gives
/// `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    /// Low risk.
    Low,
    /// Medium risk.
    Medium,
    /// High risk.
    High,
    /// Critical risk.
    Critical,
}

impl AlertLevel {
    /// All levels in ascending severity.
    pub fn all() -> &'static [AlertLevel] {
        &[Self::Low, Self::Medium, Self::High, Self::Critical]
    }

    /// The canonical string value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Whether this level is at least as severe as `threshold`.
    pub fn meets(&self, threshold: AlertLevel) -> bool {
        *self >= threshold
    }
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertLevel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|l| l.as_str() == s)
            .ok_or_else(|| {
                ValidationError::new("alert_level", format!("unknown alert level {s:?}"))
            })
    }
}

// ─── Alert Status ────────────────────────────────────────────────────

/// Handling status of an alert.
///
/// ```text
/// pending ──▶ processing ──▶ resolved ──▶ closed
///    ▲            │                         ▲
///    └────────────┤                         │
///                 └─────────────────────────┘ (with closure reason)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    /// Raised, not yet picked up.
    Pending,
    /// Assigned and being handled.
    Processing,
    /// Handled; may still be closed administratively.
    Resolved,
    /// Closed (terminal).
    Closed,
}

impl AlertStatus {
    /// All alert statuses.
    pub fn all() -> &'static [AlertStatus] {
        &[Self::Pending, Self::Processing, Self::Resolved, Self::Closed]
    }

    /// The canonical string value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }

    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Target statuses reachable from this status.
    pub fn valid_transitions(&self) -> &'static [AlertStatus] {
        match self {
            Self::Pending => &[Self::Processing],
            Self::Processing => &[Self::Resolved, Self::Pending, Self::Closed],
            Self::Resolved => &[Self::Closed],
            Self::Closed => &[],
        }
    }

    /// Whether `self -> to` appears in the transition table.
    pub fn can_transition_to(&self, to: AlertStatus) -> bool {
        self.valid_transitions().contains(&to)
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| ValidationError::new("status", format!("unknown alert status {s:?}")))
    }
}

// ─── Recall Status ───────────────────────────────────────────────────

/// Lifecycle status of a product recall.
///
/// ```text
/// draft ──approve+activate──▶ active ──▶ complete
///   │                           │
///   └──▶ cancelled ◀────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecallStatus {
    /// Being prepared; awaiting approval.
    Draft,
    /// Approved and executing.
    Active,
    /// All affected units recalled or closed by an operator (terminal).
    Complete,
    /// Aborted (terminal).
    Cancelled,
}

impl RecallStatus {
    /// All recall statuses.
    pub fn all() -> &'static [RecallStatus] {
        &[Self::Draft, Self::Active, Self::Complete, Self::Cancelled]
    }

    /// The canonical string value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Complete => "complete",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Cancelled)
    }

    /// Target statuses reachable from this status.
    pub fn valid_transitions(&self) -> &'static [RecallStatus] {
        match self {
            Self::Draft => &[Self::Active, Self::Cancelled],
            Self::Active => &[Self::Complete, Self::Cancelled],
            Self::Complete | Self::Cancelled => &[],
        }
    }

    /// Whether `self -> to` appears in the transition table.
    pub fn can_transition_to(&self, to: RecallStatus) -> bool {
        self.valid_transitions().contains(&to)
    }
}

impl std::fmt::Display for RecallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecallStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| ValidationError::new("status", format!("unknown recall status {s:?}")))
    }
}
