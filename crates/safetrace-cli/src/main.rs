//! # safetrace CLI Entry Point
//!
//! Assembles subcommands, installs logging and prints handler output.

use clap::Parser;
use safetrace_cli::{detect, progress, rules};
use tracing_subscriber::EnvFilter;

/// SafeTrace product-safety toolchain.
///
/// Checks rule files, runs one-shot anomaly detection and replays recall
/// progress.
#[derive(Parser, Debug)]
#[command(name = "safetrace", version, about)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Rule file operations.
    Rules(rules::RulesArgs),
    /// Evaluate a product payload against a rule file.
    Detect(detect::DetectArgs),
    /// Replay process quantities against a recall.
    Progress(progress::ProgressArgs),
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let output = match &cli.command {
        Commands::Rules(args) => serde_json::to_value(rules::run(args)?)?,
        Commands::Detect(args) => serde_json::to_value(detect::run(args)?)?,
        Commands::Progress(args) => serde_json::to_value(progress::run(args)?)?,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
