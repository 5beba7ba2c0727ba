//! Terraform CLI backend
//!
//! Spawns the `terraform` executable inside the fixture directory. Every
//! command runs non-interactively, is bounded by a timeout, and has its
//! failures classified against the retry policy.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

use super::{OutputSet, Provisioner, RetryPolicy, RunConfig};
use crate::common::{tail_of, Error, Result};

/// Amount of captured output kept in error messages
const ERROR_TAIL_CHARS: usize = 4000;

/// Per-command time limits
#[derive(Debug, Clone)]
pub struct Timeouts {
    pub init: Duration,
    pub apply: Duration,
    pub output: Duration,
    pub destroy: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            init: Duration::from_secs(600),
            apply: Duration::from_secs(3600),
            output: Duration::from_secs(300),
            destroy: Duration::from_secs(3600),
        }
    }
}

/// `terraform version -json`
#[derive(Deserialize, Debug)]
struct VersionOutput {
    terraform_version: String,
}

/// Captured result of a terraform invocation
#[derive(Debug)]
struct CommandOutput {
    stdout: String,
}

/// Provisioner backed by the terraform command line
#[derive(Debug, Clone)]
pub struct TerraformCli {
    binary: PathBuf,
    dir: PathBuf,
    config: RunConfig,
}

impl TerraformCli {
    /// Locate terraform and validate the fixture directory
    pub fn new(config: RunConfig) -> Result<Self> {
        if !config.fixture_dir.is_dir() {
            return Err(Error::FixtureNotFound(
                config.fixture_dir.display().to_string(),
            ));
        }
        let binary = find_terraform(config.terraform_binary.as_deref())?;
        debug!(binary = %binary.display(), fixture = %config.fixture_dir.display(), "Using terraform");

        Ok(Self {
            binary,
            dir: config.fixture_dir.clone(),
            config,
        })
    }

    pub fn fixture_dir(&self) -> &Path {
        &self.dir
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.config.retry
    }

    /// Installed terraform version
    pub async fn version(&self) -> Result<semver::Version> {
        let output = self
            .run("version", vec!["-json".into()], self.config.timeouts.output)
            .await?;
        parse_version(&output.stdout)
    }

    /// Fail if terraform is older than the configured minimum
    pub async fn check_version(&self) -> Result<()> {
        let Some(required) = &self.config.min_version else {
            return Ok(());
        };
        let found = self.version().await?;
        if found < *required {
            return Err(Error::UnsupportedVersion {
                found: found.to_string(),
                required: required.to_string(),
            });
        }
        Ok(())
    }

    fn color_args(&self) -> Vec<OsString> {
        if self.config.no_color {
            vec!["-no-color".into()]
        } else {
            Vec::new()
        }
    }

    /// Arguments shared by apply and destroy
    fn change_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-input=false".into(), "-auto-approve".into()];
        if !self.config.lock {
            args.push("-lock=false".into());
        }
        for (name, value) in &self.config.vars {
            args.push("-var".into());
            args.push(format!("{}={}", name, value).into());
        }
        for file in &self.config.var_files {
            let mut arg = OsString::from("-var-file=");
            arg.push(file.as_os_str());
            args.push(arg);
        }
        args.extend(self.color_args());
        args
    }

    async fn run(&self, command: &str, args: Vec<OsString>, limit: Duration) -> Result<CommandOutput> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg(command)
            .args(&args)
            .current_dir(&self.dir)
            .env("TF_IN_AUTOMATION", "1")
            .env("TF_INPUT", "0")
            .envs(&self.config.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(command, ?args, dir = %self.dir.display(), "Running terraform");
        let child = cmd.spawn()?;

        let progress = self.config.show_progress.then(|| spinner(command));
        let waited = timeout(limit, child.wait_with_output()).await;
        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        // On timeout the child is dropped here, and kill_on_drop ends it
        let output = match waited {
            Ok(output) => output?,
            Err(_) => {
                return Err(Error::CommandTimeout {
                    command: command.to_string(),
                    secs: limit.as_secs(),
                })
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            debug!(command, "terraform finished");
            return Ok(CommandOutput { stdout });
        }

        let combined = format!("{}\n{}", stdout, stderr);
        let detail = if stderr.trim().is_empty() { &stdout } else { &stderr };
        let detail = tail_of(detail, ERROR_TAIL_CHARS);

        match self.config.retry.classify(&combined) {
            Some(reason) => Err(Error::terraform_retryable(command, reason, &detail)),
            None => Err(Error::terraform_failed(command, output.status.code(), &detail)),
        }
    }
}

#[async_trait]
impl Provisioner for TerraformCli {
    async fn init(&self) -> Result<()> {
        info!(fixture = %self.dir.display(), "terraform init");
        let mut args: Vec<OsString> = vec!["-input=false".into(), "-upgrade=false".into()];
        args.extend(self.color_args());
        self.run("init", args, self.config.timeouts.init).await?;
        Ok(())
    }

    async fn apply(&self) -> Result<()> {
        info!(fixture = %self.dir.display(), "terraform apply");
        self.run("apply", self.change_args(), self.config.timeouts.apply)
            .await?;
        Ok(())
    }

    async fn output_all(&self) -> Result<OutputSet> {
        let mut args: Vec<OsString> = vec!["-json".into()];
        args.extend(self.color_args());
        let output = self
            .run("output", args, self.config.timeouts.output)
            .await?;
        let outputs = OutputSet::from_terraform_json(&output.stdout)?;
        info!(count = outputs.len(), "Read terraform outputs");
        Ok(outputs)
    }

    async fn destroy(&self) -> Result<()> {
        info!(fixture = %self.dir.display(), "terraform destroy");
        self.run("destroy", self.change_args(), self.config.timeouts.destroy)
            .await?;
        Ok(())
    }
}

/// Resolve the terraform executable
///
/// A configured path is authoritative; PATH is only searched when none is set.
fn find_terraform(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(Error::terraform_not_found(&[path.display().to_string()]));
    }

    which::which("terraform").map_err(|_| Error::terraform_not_found(&["PATH"]))
}

fn parse_version(json: &str) -> Result<semver::Version> {
    let parsed: VersionOutput =
        serde_json::from_str(json).map_err(|e| Error::OutputParse(e.to_string()))?;
    semver::Version::parse(parsed.terraform_version.trim_start_matches('v')).map_err(|e| {
        Error::OutputParse(format!(
            "Unrecognised terraform version '{}': {}",
            parsed.terraform_version, e
        ))
    })
}

fn spinner(command: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {spinner:.cyan} {msg} ({elapsed})")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(format!("terraform {}", command));
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}
