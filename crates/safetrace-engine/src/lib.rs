//! # safetrace-engine: Recall Lifecycle Orchestrator
//!
//! Ties the rule engine and the lifecycle state machines together:
//!
//! - [`Orchestrator`] registers detection-raised and manually reported
//!   alerts, escalates alerts into recalls, and records recall processes,
//!   completing a recall once its progress reaches 100%.
//! - [`Registry`] holds records keyed by code, each behind its own lock.
//! - [`EngineConfig`] comes from YAML plus `SAFETRACE_*` environment
//!   overrides.
//!
//! Time and codes are injected (`Clock`, `CodeGenerator`), so a fixed clock
//! and a sequence generator make every run reproducible.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod registry;

pub use config::{load_rule_file, parse_rule_set, AutomatedActor, ConfigError, EngineConfig};
pub use error::EngineError;
pub use orchestrator::{Orchestrator, ProcessOutcome, RaisedAlerts, RecallEntry};
pub use registry::Registry;
