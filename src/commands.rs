//! CLI command definitions
//!
//! Defines the clap commands for the tfscenario CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run a scenario: apply, compare expected/actual outputs, destroy
    Test {
        /// Path to a YAML scenario file (default: built-in simple Databricks cluster scenario)
        path: Option<PathBuf>,

        /// Fixture directory for the built-in scenario
        #[arg(long, conflicts_with = "path")]
        fixture: Option<PathBuf>,

        /// Verbose output
        #[arg(long, short)]
        verbose: bool,
    },

    /// Init and apply a fixture module (with retries), leaving it deployed
    Apply {
        /// Fixture module directory
        dir: PathBuf,

        /// Terraform input variable (NAME=VALUE), can be repeated
        #[arg(long = "var", value_parser = parse_key_val)]
        vars: Vec<(String, String)>,
    },

    /// Print every output of an applied fixture module
    Output {
        /// Fixture module directory
        dir: PathBuf,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Destroy everything an applied fixture module created
    Destroy {
        /// Fixture module directory
        dir: PathBuf,

        /// Terraform input variable (NAME=VALUE), can be repeated
        #[arg(long = "var", value_parser = parse_key_val)]
        vars: Vec<(String, String)>,
    },

    /// Show the detected terraform version
    Version,
}

/// Parse a NAME=VALUE pair
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))?;
    if name.is_empty() {
        return Err(format!("missing variable name in '{}'", s));
    }
    Ok((name.to_string(), value.to_string()))
}
