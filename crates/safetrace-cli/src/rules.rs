//! # Rules Subcommand
//!
//! `safetrace rules check <file>` loads a `{rules: [...]}` YAML or JSON file
//! into a fresh catalog and prints the load report.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Subcommand};
use safetrace_engine::load_rule_file;
use safetrace_rules::{ReloadReport, RuleCatalog};

/// Arguments for the rules subcommand.
#[derive(Args, Debug)]
pub struct RulesArgs {
    #[command(subcommand)]
    pub command: RulesCommand,
}

/// Rule file operations.
#[derive(Subcommand, Debug)]
pub enum RulesCommand {
    /// Compile every rule in a file and report skipped ones.
    Check(CheckArgs),
}

/// Arguments for `rules check`.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Rule file.
    pub file: PathBuf,

    /// Fail when any rule is skipped.
    #[arg(long)]
    pub strict: bool,
}

/// Run the rules subcommand.
pub fn run(args: &RulesArgs) -> anyhow::Result<ReloadReport> {
    match &args.command {
        RulesCommand::Check(check) => check_file(check),
    }
}

fn check_file(args: &CheckArgs) -> anyhow::Result<ReloadReport> {
    let definitions = load_rule_file(&args.file)
        .with_context(|| format!("loading rules from {}", args.file.display()))?;
    let (_, report) = RuleCatalog::from_definitions(&definitions);
    if args.strict && !report.skipped.is_empty() {
        let codes: Vec<&str> = report.skipped.iter().map(|s| s.rule_code.as_str()).collect();
        anyhow::bail!("{} rule(s) skipped: {}", codes.len(), codes.join(", "));
    }
    Ok(report)
}
