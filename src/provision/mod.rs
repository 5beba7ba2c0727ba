//! Provisioning backend
//!
//! The scenario runner only ever talks to infrastructure through the
//! [`Provisioner`] trait. [`TerraformCli`] drives the real `terraform`
//! binary; tests substitute an in-memory backend.

pub mod output;
pub mod retry;
pub mod terraform;

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::common::config::Config;
use crate::common::Result;

pub use output::{OutputSet, REDACTED};
pub use retry::RetryPolicy;
pub use terraform::{TerraformCli, Timeouts};

/// The four lifecycle operations of a provisioning tool
///
/// Failures that are worth retrying must surface as errors whose
/// `is_retryable()` is true; the caller decides whether to retry.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Prepare the working directory (providers, modules, backend)
    async fn init(&self) -> Result<()>;

    /// Create or update the declared infrastructure
    async fn apply(&self) -> Result<()>;

    /// Read every declared output of the applied module
    async fn output_all(&self) -> Result<OutputSet>;

    /// Remove everything `apply` created
    async fn destroy(&self) -> Result<()>;
}

/// Everything needed to run terraform against one fixture
///
/// Built once at scenario start and never mutated afterwards. Credentials
/// and other ambient settings are injected through `env` rather than read
/// implicitly by the runner.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Directory of the fixture module
    pub fixture_dir: PathBuf,
    /// Retry policy for transient provisioning errors
    pub retry: RetryPolicy,
    /// Extra environment for the terraform process
    pub env: BTreeMap<String, String>,
    /// `-var name=value` inputs for apply/destroy
    pub vars: BTreeMap<String, String>,
    /// `-var-file` inputs for apply/destroy
    pub var_files: Vec<PathBuf>,
    /// Explicit terraform executable; PATH is searched when unset
    pub terraform_binary: Option<PathBuf>,
    pub no_color: bool,
    pub lock: bool,
    pub timeouts: Timeouts,
    /// Minimum accepted terraform version
    pub min_version: Option<semver::Version>,
    /// Show a spinner while terraform runs
    pub show_progress: bool,
}

impl RunConfig {
    /// Defaults for a fixture directory
    pub fn new(fixture_dir: impl Into<PathBuf>) -> Self {
        Self {
            fixture_dir: fixture_dir.into(),
            retry: RetryPolicy::with_default_retryable_errors(),
            env: BTreeMap::new(),
            vars: BTreeMap::new(),
            var_files: Vec::new(),
            terraform_binary: None,
            no_color: true,
            lock: true,
            timeouts: Timeouts::default(),
            min_version: None,
            show_progress: false,
        }
    }

    /// Defaults for a fixture directory, overlaid with the user's config file
    pub fn from_config(fixture_dir: impl Into<PathBuf>, config: &Config) -> Result<Self> {
        let min_version = config
            .terraform
            .min_version
            .as_deref()
            .map(|v| {
                semver::Version::parse(v).map_err(|e| {
                    crate::common::Error::Config(format!(
                        "Invalid terraform.min_version '{}': {}",
                        v, e
                    ))
                })
            })
            .transpose()?;

        Ok(Self {
            retry: config.retry.to_policy(),
            env: config.env.clone(),
            terraform_binary: config.terraform.binary.clone(),
            no_color: config.terraform.no_color,
            lock: config.terraform.lock,
            timeouts: config.timeouts.to_command_timeouts(),
            min_version,
            ..Self::new(fixture_dir)
        })
    }
}
