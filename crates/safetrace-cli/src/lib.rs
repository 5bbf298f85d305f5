//! # safetrace-cli: SafeTrace Command-Line Interface
//!
//! ## Subcommands
//!
//! - `rules check`: load a rule file and report what compiles
//! - `detect`: evaluate one product payload against a rule file
//! - `progress`: replay process quantities against a recall
//!
//! Handlers parse arguments, read input files and delegate to the domain
//! crates. Every handler returns a serializable value that `main` prints as
//! pretty JSON on stdout; logs go to stderr.

pub mod detect;
pub mod progress;
pub mod rules;

use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;

/// Read and parse a JSON file.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}
