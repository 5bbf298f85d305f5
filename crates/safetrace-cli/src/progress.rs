//! # Progress Subcommand
//!
//! `safetrace progress --recall <json> --events <json>` replays process
//! quantities against a recall's current quantities and prints the outcome.
//! Events are a JSON array whose items are either bare quantities or
//! process records carrying `processed_quantity`.

use std::path::PathBuf;

use clap::Args;
use serde::Deserialize;
use safetrace_state::{ProgressState, ReplayOutcome};

use crate::read_json;

/// Arguments for the progress subcommand.
#[derive(Args, Debug)]
pub struct ProgressArgs {
    /// Recall JSON (only `affected_quantity` and `recalled_quantity` are read).
    #[arg(long)]
    pub recall: PathBuf,

    /// JSON array of process events, in arrival order.
    #[arg(long)]
    pub events: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProcessEvent {
    Quantity(u64),
    Record { processed_quantity: u64 },
}

impl ProcessEvent {
    fn quantity(&self) -> u64 {
        match self {
            Self::Quantity(q) | Self::Record { processed_quantity: q } => *q,
        }
    }
}

/// Run the progress subcommand.
pub fn run(args: &ProgressArgs) -> anyhow::Result<ReplayOutcome> {
    let state: ProgressState = read_json(&args.recall)?;
    let events: Vec<ProcessEvent> = read_json(&args.events)?;
    let outcome = state.replay(events.iter().map(ProcessEvent::quantity));
    if outcome.applied < events.len() {
        tracing::info!(
            ignored = events.len() - outcome.applied,
            "events after completion were not applied"
        );
    }
    Ok(outcome)
}
