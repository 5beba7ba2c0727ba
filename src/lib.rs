//! tf-scenario - deploy a Terraform fixture, compare its outputs, destroy it
//!
//! This library runs "deploy, compare outputs, destroy" scenarios against
//! Terraform fixture modules, with bounded retries for transient
//! provisioning errors and guaranteed teardown.

pub mod cli;
pub mod commands;
pub mod common;
pub mod provision;
pub mod scenario;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use provision::{OutputSet, Provisioner, RetryPolicy, RunConfig};
pub use scenario::{OutputPair, PairCheck, Scenario, ScenarioReport, ScenarioRunner, ScenarioState};
