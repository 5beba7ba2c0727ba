//! Error types for the scenario runner
//!
//! Provisioning failures are split into retryable (transient backend or
//! network trouble) and fatal classes. Only the retryable class is ever
//! recovered, and only while bringing infrastructure up.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the scenario runner
#[derive(Error, Debug)]
pub enum Error {
    // === Terraform Invocation Errors ===
    #[error("Terraform executable not found. Searched: {searched}")]
    TerraformNotFound { searched: String },

    #[error("terraform {command} failed with exit code {exit_code:?}: {stderr}")]
    TerraformFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("terraform {command} hit a transient error ({reason}): {message}")]
    TerraformRetryable {
        command: String,
        reason: String,
        message: String,
    },

    #[error("'{description}' still failing after {attempts} attempts: {last}")]
    RetriesExhausted {
        description: String,
        attempts: u32,
        #[source]
        last: Box<Error>,
    },

    #[error("terraform {command} timed out after {secs} seconds")]
    CommandTimeout { command: String, secs: u64 },

    #[error("Terraform {found} is older than the required minimum {required}")]
    UnsupportedVersion { found: String, required: String },

    // === Output Errors ===
    #[error("Malformed terraform output: {0}")]
    OutputParse(String),

    #[error("Output '{0}' is not declared by the fixture module")]
    MissingOutput(String),

    // === Scenario Errors ===
    #[error("Fixture directory '{0}' does not exist")]
    FixtureNotFound(String),

    #[error("Scenario body aborted: {0}")]
    ScenarioAborted(String),

    #[error("Test assertion failed: {0}")]
    TestAssertion(String),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a terraform not found error with search locations
    pub fn terraform_not_found<S: AsRef<str>>(paths: &[S]) -> Self {
        Self::TerraformNotFound {
            searched: paths.iter().map(|s| s.as_ref()).collect::<Vec<_>>().join(", "),
        }
    }

    /// Create a non-retryable terraform failure
    pub fn terraform_failed(command: &str, exit_code: Option<i32>, stderr: &str) -> Self {
        Self::TerraformFailed {
            command: command.to_string(),
            exit_code,
            stderr: stderr.trim().to_string(),
        }
    }

    /// Create a retryable terraform failure
    pub fn terraform_retryable(command: &str, reason: &str, message: &str) -> Self {
        Self::TerraformRetryable {
            command: command.to_string(),
            reason: reason.to_string(),
            message: message.trim().to_string(),
        }
    }

    /// Whether the retry policy may attempt the operation again
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::TerraformRetryable { .. })
    }
}
