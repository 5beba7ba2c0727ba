//! Scenario runner implementation
//!
//! Drives one deploy / compare / destroy cycle:
//!
//! `Configured -> Applied -> OutputsRead -> Asserted -> Destroyed`
//!
//! The steps up to `Asserted` run in their own task. Whatever happens in
//! there (success, fatal provisioning error, panic) the runner waits for
//! it and then destroys the infrastructure exactly once. An interrupt
//! (Ctrl-C, SIGTERM) aborts the task and goes straight to teardown.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use colored::Colorize;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::common::{Error, Result};
use crate::provision::retry::retry;
use crate::provision::{OutputSet, Provisioner, RetryPolicy, TerraformCli};

use super::config::{OutputPair, PairSelection, Scenario};

/// Lifecycle position of a scenario run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScenarioState {
    Configured,
    Applied,
    OutputsRead,
    Asserted,
    Destroyed,
}

impl fmt::Display for ScenarioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioState::Configured => write!(f, "configured"),
            ScenarioState::Applied => write!(f, "applied"),
            ScenarioState::OutputsRead => write!(f, "outputs read"),
            ScenarioState::Asserted => write!(f, "asserted"),
            ScenarioState::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// Verdict for one output pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairCheck {
    Match {
        pair: OutputPair,
        value: String,
    },
    Mismatch {
        pair: OutputPair,
        expected: String,
        actual: String,
    },
    Missing {
        pair: OutputPair,
        keys: Vec<String>,
    },
}

impl PairCheck {
    pub fn pair(&self) -> &OutputPair {
        match self {
            PairCheck::Match { pair, .. }
            | PairCheck::Mismatch { pair, .. }
            | PairCheck::Missing { pair, .. } => pair,
        }
    }

    pub fn passed(&self) -> bool {
        matches!(self, PairCheck::Match { .. })
    }
}

impl fmt::Display for PairCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let OutputPair { expected: lhs, actual: rhs } = self.pair();
        match self {
            PairCheck::Match { value, .. } => write!(f, "{} == {} ({})", lhs, rhs, value),
            PairCheck::Mismatch {
                expected, actual, ..
            } => write!(
                f,
                "{} != {}: expected '{}', got '{}'",
                lhs, rhs, expected, actual
            ),
            PairCheck::Missing { keys, .. } => write!(
                f,
                "{} vs {}: output not declared: {}",
                lhs,
                rhs,
                keys.join(", ")
            ),
        }
    }
}

/// Outcome of a scenario run
#[derive(Debug)]
pub struct ScenarioReport {
    pub name: String,
    /// Furthest state reached before teardown
    pub reached: ScenarioState,
    /// One entry per checked pair, in declaration order
    pub checks: Vec<PairCheck>,
    /// Error that aborted the scenario body, if any
    pub fatal: Option<Error>,
    /// Error from teardown, if any
    pub teardown_error: Option<Error>,
}

impl ScenarioReport {
    /// All pairs matched, nothing aborted, and teardown succeeded
    pub fn passed(&self) -> bool {
        self.fatal.is_none()
            && self.teardown_error.is_none()
            && self.checks.iter().all(PairCheck::passed)
    }

    pub fn failed_checks(&self) -> impl Iterator<Item = &PairCheck> {
        self.checks.iter().filter(|c| !c.passed())
    }

    /// Final lifecycle state, counting successful teardown
    pub fn final_state(&self) -> ScenarioState {
        if self.teardown_error.is_none() {
            ScenarioState::Destroyed
        } else {
            self.reached
        }
    }

    /// Print a colored summary to stdout
    pub fn print(&self) {
        println!("\n{}", "Checks:".cyan());
        if self.checks.is_empty() {
            println!("  {}", "(no pairs checked)".dimmed());
        }
        for check in &self.checks {
            if check.passed() {
                println!("  {} {}", "✓".green(), check.to_string().dimmed());
            } else {
                println!("  {} {}", "✗".red(), check);
            }
        }

        if let Some(e) = &self.fatal {
            println!(
                "\n  {} Aborted after '{}': {}",
                "✗".red(),
                self.reached,
                e
            );
        }

        match &self.teardown_error {
            None => println!("\n  {} Infrastructure destroyed", "✓".green()),
            Some(e) => println!("\n  {} Teardown failed: {}", "✗".red(), e),
        }

        if self.passed() {
            println!(
                "\n{} {}\n",
                "✓".green().bold(),
                "Scenario Passed".green().bold()
            );
        } else {
            println!(
                "\n{} {}\n",
                "✗".red().bold(),
                "Scenario Failed".red().bold()
            );
        }
    }
}

/// Init then apply the fixture, retrying transient failures of each step
pub async fn apply(provisioner: &dyn Provisioner, policy: &RetryPolicy) -> Result<()> {
    retry(policy, "terraform init", || provisioner.init()).await?;
    retry(policy, "terraform apply", || provisioner.apply()).await
}

/// Read every output of the applied module
pub async fn read_outputs(provisioner: &dyn Provisioner) -> Result<OutputSet> {
    provisioner.output_all().await
}

/// Compare every pair, continuing past failures
pub fn assert_pairs_equal(outputs: &OutputSet, pairs: &[OutputPair]) -> Vec<PairCheck> {
    pairs
        .iter()
        .map(|pair| check_pair(outputs, pair))
        .collect()
}

fn check_pair(outputs: &OutputSet, pair: &OutputPair) -> PairCheck {
    let expected = outputs.require(&pair.expected);
    let actual = outputs.require(&pair.actual);

    let (expected, actual) = match (expected, actual) {
        (Ok(e), Ok(a)) => (e, a),
        (e, a) => {
            let keys = [(&pair.expected, e.is_err()), (&pair.actual, a.is_err())]
                .into_iter()
                .filter(|(_, missing)| *missing)
                .map(|(key, _)| key.clone())
                .collect();
            return PairCheck::Missing {
                pair: pair.clone(),
                keys,
            };
        }
    };

    let shown = |key: &str, value: &str| outputs.displayed(key, value).to_string();

    if expected == actual {
        PairCheck::Match {
            pair: pair.clone(),
            value: shown(&pair.actual, actual),
        }
    } else {
        PairCheck::Mismatch {
            pair: pair.clone(),
            expected: shown(&pair.expected, expected),
            actual: shown(&pair.actual, actual),
        }
    }
}

/// Tear down everything `apply` created. Single attempt.
pub async fn destroy(provisioner: &dyn Provisioner) -> Result<()> {
    provisioner.destroy().await
}

/// Runs one scenario against a provisioning backend
pub struct ScenarioRunner {
    name: String,
    provisioner: Arc<dyn Provisioner>,
    retry: RetryPolicy,
    pairs: PairSelection,
}

impl ScenarioRunner {
    pub fn new(
        name: impl Into<String>,
        provisioner: Arc<dyn Provisioner>,
        retry: RetryPolicy,
        pairs: PairSelection,
    ) -> Self {
        Self {
            name: name.into(),
            provisioner,
            retry,
            pairs,
        }
    }

    /// Apply, read outputs, compare, then destroy no matter what happened,
    /// including an interrupt from the terminal
    pub async fn run(self) -> ScenarioReport {
        self.run_until(interrupted()).await
    }

    /// Like [`run`](Self::run), but `interrupt` stands in for the signal
    /// listener. When it resolves first the body is aborted and teardown
    /// runs.
    pub async fn run_until<F>(self, interrupt: F) -> ScenarioReport
    where
        F: Future<Output = ()>,
    {
        info!(scenario = %self.name, "Scenario configured");

        let (state_tx, state_rx) = watch::channel(ScenarioState::Configured);
        let mut body = tokio::spawn(exercise(
            Arc::clone(&self.provisioner),
            self.retry.clone(),
            self.pairs.clone(),
            state_tx,
        ));

        let (checks, fatal) = tokio::select! {
            joined = &mut body => match joined {
                Ok(Ok(checks)) => (checks, None),
                Ok(Err(e)) => {
                    error!(scenario = %self.name, error = %e, "Scenario aborted");
                    (Vec::new(), Some(e))
                }
                Err(join_error) => {
                    let reason = describe_join_error(join_error);
                    error!(scenario = %self.name, %reason, "Scenario body panicked");
                    (Vec::new(), Some(Error::ScenarioAborted(reason)))
                }
            },
            () = interrupt => {
                warn!(scenario = %self.name, "Interrupted, tearing down");
                body.abort();
                // Running terraform children are killed when the task drops them
                let _ = (&mut body).await;
                (Vec::new(), Some(Error::ScenarioAborted("interrupted".to_string())))
            }
        };
        let reached = *state_rx.borrow();

        let teardown_error = match destroy(self.provisioner.as_ref()).await {
            Ok(()) => {
                info!(scenario = %self.name, "Infrastructure destroyed");
                None
            }
            Err(e) => {
                error!(scenario = %self.name, error = %e, "Teardown failed");
                Some(e)
            }
        };

        ScenarioReport {
            name: self.name,
            reached,
            checks,
            fatal,
            teardown_error,
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix. Pends forever when no listener
/// can be installed.
async fn interrupted() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

async fn exercise(
    provisioner: Arc<dyn Provisioner>,
    policy: RetryPolicy,
    pairs: PairSelection,
    state: watch::Sender<ScenarioState>,
) -> Result<Vec<PairCheck>> {
    apply(provisioner.as_ref(), &policy).await?;
    state.send_replace(ScenarioState::Applied);

    let outputs = read_outputs(provisioner.as_ref()).await?;
    state.send_replace(ScenarioState::OutputsRead);

    let pairs = pairs.resolve(&outputs)?;
    let checks = assert_pairs_equal(&outputs, &pairs);
    for check in checks.iter().filter(|c| !c.passed()) {
        warn!(%check, "Output pair check failed");
    }
    state.send_replace(ScenarioState::Asserted);

    Ok(checks)
}

fn describe_join_error(join_error: tokio::task::JoinError) -> String {
    if !join_error.is_panic() {
        return join_error.to_string();
    }
    let payload = join_error.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

/// Run a scenario against terraform and print the summary
pub async fn run_scenario(mut scenario: Scenario, verbose: bool) -> Result<ScenarioReport> {
    println!(
        "\n{} {}",
        "Running Scenario:".blue().bold(),
        scenario.name.white().bold()
    );
    if let Some(desc) = &scenario.description {
        println!("  {}", desc.dimmed());
    }
    if verbose {
        println!(
            "  Fixture: {}",
            scenario.run.fixture_dir.display().to_string().dimmed()
        );
    }

    scenario.run.show_progress = !verbose;
    let policy = scenario.run.retry.clone();
    let terraform = TerraformCli::new(scenario.run)?;
    terraform.check_version().await?;

    let report = ScenarioRunner::new(scenario.name, Arc::new(terraform), policy, scenario.pairs)
        .run()
        .await;
    report.print();
    Ok(report)
}
