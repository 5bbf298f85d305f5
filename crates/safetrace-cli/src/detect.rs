//! # Detect Subcommand
//!
//! `safetrace detect --rules <file> --request <json>` evaluates one product
//! payload against a rule file and prints the detection report. Nothing is
//! registered; proposed alerts carry no codes.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use safetrace_core::Timestamp;
use safetrace_engine::load_rule_file;
use safetrace_rules::{
    DetectAnomalyRequest, DetectionReport, DetectionService, RuleCatalog, DEFAULT_SCOPE_FIELD,
};

use crate::read_json;

/// Arguments for the detect subcommand.
#[derive(Args, Debug)]
pub struct DetectArgs {
    /// Rule file (`{rules: [...]}`, YAML or JSON).
    #[arg(long)]
    pub rules: PathBuf,

    /// Detection request JSON file.
    #[arg(long)]
    pub request: PathBuf,

    /// Evaluation instant (RFC 3339 or `YYYY-MM-DD`); defaults to now.
    #[arg(long)]
    pub now: Option<String>,

    /// Attach per-leaf evaluation traces.
    #[arg(long)]
    pub trace: bool,

    /// Product field holding the category.
    #[arg(long, default_value = DEFAULT_SCOPE_FIELD)]
    pub scope_field: String,
}

/// Run the detect subcommand.
pub fn run(args: &DetectArgs) -> anyhow::Result<DetectionReport> {
    let definitions = load_rule_file(&args.rules)
        .with_context(|| format!("loading rules from {}", args.rules.display()))?;
    let (catalog, load) = RuleCatalog::from_definitions(&definitions);
    if !load.skipped.is_empty() {
        tracing::warn!(skipped = load.skipped.len(), "some rules were skipped at load");
    }

    let request: DetectAnomalyRequest = read_json(&args.request)?;
    let now = match &args.now {
        Some(raw) => Timestamp::parse_lenient(raw)
            .with_context(|| format!("invalid --now value {raw:?}"))?,
        None => Timestamp::now(),
    };

    let service = DetectionService::new(Arc::new(catalog))
        .with_scope_field(args.scope_field.clone())
        .with_trace(args.trace);
    let report = service.detect(&request, now).context("running detection")?;
    tracing::info!(
        traceability_code = %report.traceability_code,
        evaluated = report.evaluated.len(),
        alerts = report.alerts.len(),
        "detection finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use safetrace_core::AlertType;

    fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn args(dir: &tempfile::TempDir, request: &str, trace: bool) -> DetectArgs {
        DetectArgs {
            rules: write(
                dir,
                "rules.yaml",
                concat!(
                    "rules:\n",
                    "  - rule_code: R-EXP\n",
                    "    rule_name: Expired\n",
                    "    alert_type: expired\n",
                    "    alert_level: high\n",
                    "    trigger_conditions: {field: expiry_date, op: lt, value: {now: 0}}\n",
                ),
            ),
            request: write(dir, "request.json", request),
            now: Some("2024-06-01T00:00:00Z".into()),
            trace,
            scope_field: DEFAULT_SCOPE_FIELD.into(),
        }
    }

    #[test]
    fn expired_product_yields_one_alert() {
        let dir = tempfile::tempdir().unwrap();
        let args = args(
            &dir,
            r#"{"traceability_code":"TRC-1","product_data":{"expiry_date":"2020-01-01"}}"#,
            true,
        );
        let report = run(&args).unwrap();
        assert_eq!(report.alerts.len(), 1);
        assert_eq!(report.alerts[0].alert_type, AlertType::Expired);
        assert!(report.alerts[0].trace.is_some());
    }

    #[test]
    fn fresh_product_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let args = args(
            &dir,
            r#"{"traceability_code":"TRC-1","product_data":{"expiry_date":"2030-01-01"}}"#,
            false,
        );
        assert!(!run(&args).unwrap().has_alerts());
    }

    #[test]
    fn bad_now_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = args(&dir, r#"{"traceability_code":"TRC-1","product_data":{}}"#, false);
        args.now = Some("yesterday".into());
        assert!(run(&args).unwrap_err().to_string().contains("--now"));
    }
}
