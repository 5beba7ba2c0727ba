//! Deploy / compare outputs / destroy scenarios
//!
//! A scenario applies a fixture module, reads back every declared output,
//! checks that each `expected_*` output equals its `actual_*` partner, and
//! always tears the infrastructure down afterwards.

mod config;
mod runner;

pub use config::*;
pub use runner::{
    apply, assert_pairs_equal, destroy, read_outputs, run_scenario, PairCheck, ScenarioReport,
    ScenarioRunner, ScenarioState,
};
