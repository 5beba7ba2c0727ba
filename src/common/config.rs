//! Configuration file handling

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use super::paths::config_path;
use super::Result;
use crate::provision::retry::RetryPolicy;
use crate::provision::terraform::Timeouts as CommandTimeouts;

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Terraform invocation settings
    #[serde(default)]
    pub terraform: TerraformConfig,

    /// Retry settings for transient provisioning errors
    #[serde(default)]
    pub retry: RetryConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Environment passed to every terraform process (credentials etc.)
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Terraform invocation settings
#[derive(Debug, Deserialize, Clone)]
pub struct TerraformConfig {
    /// Path to the terraform executable; searched in PATH when unset
    pub binary: Option<PathBuf>,

    /// Pass -no-color to every command
    #[serde(default = "default_true")]
    pub no_color: bool,

    /// Hold the state lock during apply/destroy
    #[serde(default = "default_true")]
    pub lock: bool,

    /// Refuse to run against a terraform older than this
    pub min_version: Option<String>,
}

impl Default for TerraformConfig {
    fn default() -> Self {
        Self {
            binary: None,
            no_color: true,
            lock: true,
            min_version: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Retry settings
#[derive(Debug, Deserialize)]
pub struct RetryConfig {
    /// Extra attempts after the first failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Pause between attempts
    #[serde(default = "default_time_between_retries")]
    pub time_between_retries_secs: u64,

    /// Additional retryable error substrings mapped to a reason
    #[serde(default)]
    pub retryable_errors: BTreeMap<String, String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            time_between_retries_secs: default_time_between_retries(),
            retryable_errors: BTreeMap::new(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_time_between_retries() -> u64 {
    5
}

impl RetryConfig {
    /// Build a retry policy from the defaults plus configured additions
    pub fn to_policy(&self) -> RetryPolicy {
        let mut policy = RetryPolicy::with_default_retryable_errors()
            .max_retries(self.max_retries)
            .time_between_retries(Duration::from_secs(self.time_between_retries_secs));
        for (pattern, reason) in &self.retryable_errors {
            policy = policy.retryable_error(pattern, reason);
        }
        policy
    }
}

/// Timeout settings in seconds
#[derive(Debug, Deserialize)]
pub struct Timeouts {
    #[serde(default = "default_init")]
    pub init_secs: u64,

    #[serde(default = "default_apply")]
    pub apply_secs: u64,

    #[serde(default = "default_output")]
    pub output_secs: u64,

    #[serde(default = "default_destroy")]
    pub destroy_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            init_secs: default_init(),
            apply_secs: default_apply(),
            output_secs: default_output(),
            destroy_secs: default_destroy(),
        }
    }
}

fn default_init() -> u64 {
    600
}
fn default_apply() -> u64 {
    3600
}
fn default_output() -> u64 {
    300
}
fn default_destroy() -> u64 {
    3600
}

impl Timeouts {
    pub fn to_command_timeouts(&self) -> CommandTimeouts {
        CommandTimeouts {
            init: Duration::from_secs(self.init_secs),
            apply: Duration::from_secs(self.apply_secs),
            output: Duration::from_secs(self.output_secs),
            destroy: Duration::from_secs(self.destroy_secs),
        }
    }
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    super::Error::FileRead {
                        path: path.display().to_string(),
                        error: e.to_string(),
                    }
                })?;
                return Self::parse(&content);
            }
        }
        Ok(Self::default())
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }
}
