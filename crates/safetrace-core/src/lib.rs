//! # safetrace-core: Foundational Types for SafeTrace
//!
//! The leaf crate of the SafeTrace workspace. It defines the vocabulary that
//! the rule engine and the recall lifecycle both speak:
//!
//! 1. **Closed enumerations.** `AlertType`, `AlertLevel`, `AlertStatus` and
//!    `RecallStatus` with fixed lowercase string values. Status enums carry
//!    their own transition tables (`valid_transitions()`), so every legal
//!    lifecycle edge is enumerable in one place.
//!
//! 2. **Code newtypes.** `AlertCode`, `RecallCode`, `RuleCode` and
//!    `TraceabilityCode` are validated at construction and at deserialization.
//!    Fresh alert and recall codes come from an injected [`CodeGenerator`].
//!
//! 3. **UTC-only timestamps.** [`Timestamp`] is seconds-precision UTC, and the
//!    current time is read through a [`Clock`] so that lifecycle operations
//!    stay deterministic under test.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `safetrace-*` crates.
//! - No `unsafe` code, no `.unwrap()` outside tests.

pub mod domain;
pub mod error;
pub mod identity;
pub mod temporal;

pub use domain::{AlertLevel, AlertStatus, AlertType, RecallStatus};
pub use error::{require_non_blank, StateError, ValidationError};
pub use identity::{
    AlertCode, CodeGenerator, RecallCode, RuleCode, SequenceCodeGenerator, TraceabilityCode,
    UuidCodeGenerator,
};
pub use temporal::{Clock, FixedClock, SystemClock, Timestamp};
