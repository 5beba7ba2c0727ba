//! Scenario definitions
//!
//! A scenario names a fixture module, the inputs it is applied with, and
//! the output pairs that must agree once it is up. Scenarios come either
//! from YAML files or from the built-in simple Databricks cluster scenario.

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::common::config::Config;
use crate::common::paths::resolve_relative;
use crate::common::{Error, Result};
use crate::provision::{OutputSet, RunConfig};

/// Fixture directory of the built-in scenario, relative to the working directory
pub const SIMPLE_DATABRICKS_CLUSTER_FIXTURE: &str = "fixtures/simple-databricks-cluster";

const EXPECTED_PREFIX: &str = "expected_";
const ACTUAL_PREFIX: &str = "actual_";

/// Two outputs that must hold the same value
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OutputPair {
    /// Output holding the value the module should produce
    pub expected: String,
    /// Output holding the value the module did produce
    pub actual: String,
}

impl OutputPair {
    pub fn new(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// `expected_<suffix>` paired with `actual_<suffix>`
    pub fn for_suffix(suffix: &str) -> Self {
        Self::new(
            format!("{}{}", EXPECTED_PREFIX, suffix),
            format!("{}{}", ACTUAL_PREFIX, suffix),
        )
    }

    /// One pair per `X` for which either `expected_X` or `actual_X` is
    /// declared. A half-declared pair is kept so the check reports the
    /// missing side.
    pub fn discover(outputs: &OutputSet) -> Vec<OutputPair> {
        let suffixes: BTreeSet<&str> = outputs
            .names()
            .filter_map(|name| {
                name.strip_prefix(EXPECTED_PREFIX)
                    .or_else(|| name.strip_prefix(ACTUAL_PREFIX))
            })
            .collect();
        suffixes.into_iter().map(OutputPair::for_suffix).collect()
    }
}

/// The pairs checked by the simple Databricks cluster scenario
pub fn simple_databricks_cluster_pairs() -> Vec<OutputPair> {
    vec![
        OutputPair::for_suffix("standard_name"),
        OutputPair::for_suffix("single_node_name"),
        OutputPair::for_suffix("high_concurrency_name"),
    ]
}

/// Which output pairs a scenario compares
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairSelection {
    /// Exactly these pairs; missing keys are failures
    Explicit(Vec<OutputPair>),
    /// Whatever `expected_X`/`actual_X` pairs the module declares
    Discover,
}

impl PairSelection {
    pub fn resolve(&self, outputs: &OutputSet) -> Result<Vec<OutputPair>> {
        match self {
            PairSelection::Explicit(pairs) => Ok(pairs.clone()),
            PairSelection::Discover => {
                let pairs = OutputPair::discover(outputs);
                if pairs.is_empty() {
                    return Err(Error::TestAssertion(
                        "Fixture declares no expected_*/actual_* output pairs".to_string(),
                    ));
                }
                Ok(pairs)
            }
        }
    }
}

/// A scenario as written in YAML
#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct ScenarioFile {
    /// Name of the scenario
    pub name: String,
    /// Optional description of what the scenario verifies
    pub description: Option<String>,
    /// Fixture module directory, relative to the scenario file
    pub fixture: PathBuf,
    /// Terraform input variables
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
    /// Terraform variable files, relative to the scenario file
    #[serde(default)]
    pub var_files: Vec<PathBuf>,
    /// Extra environment for terraform, layered over the config file's
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Pairs to compare; discovered from the outputs when omitted
    pub pairs: Option<Vec<OutputPair>>,
}

/// A scenario ready to run
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub description: Option<String>,
    pub run: RunConfig,
    pub pairs: PairSelection,
}

impl Scenario {
    /// Deploy the simple Databricks cluster fixture and compare its
    /// standard, single-node and high-concurrency cluster names
    pub fn simple_databricks_cluster(fixture_dir: impl Into<PathBuf>, config: &Config) -> Result<Self> {
        Ok(Self {
            name: "simple-databricks-cluster".to_string(),
            description: Some(
                "Cluster names produced by the module match the naming convention".to_string(),
            ),
            run: RunConfig::from_config(fixture_dir, config)?,
            pairs: PairSelection::Explicit(simple_databricks_cluster_pairs()),
        })
    }

    /// Load a scenario from a YAML file
    pub fn load(path: &Path, config: &Config) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read scenario '{}': {}",
                path.display(),
                e
            ))
        })?;
        let base_dir = path.parent().unwrap_or(Path::new("."));
        Self::from_yaml(&content, base_dir, config)
    }

    /// Parse a scenario, resolving relative paths against `base_dir`
    pub fn from_yaml(content: &str, base_dir: &Path, config: &Config) -> Result<Self> {
        let file: ScenarioFile = serde_yaml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse scenario: {}", e)))?;

        let pairs = match file.pairs {
            Some(pairs) if pairs.is_empty() => {
                return Err(Error::Config(format!(
                    "Scenario '{}' lists no output pairs",
                    file.name
                )))
            }
            Some(pairs) => PairSelection::Explicit(pairs),
            None => PairSelection::Discover,
        };

        let mut run = RunConfig::from_config(resolve_relative(base_dir, &file.fixture), config)?;
        run.vars = file.vars;
        run.var_files = file
            .var_files
            .iter()
            .map(|f| resolve_relative(base_dir, f))
            .collect();
        run.env.extend(file.env);

        Ok(Self {
            name: file.name,
            description: file.description,
            run,
            pairs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_pairs() {
        let pairs = simple_databricks_cluster_pairs();
        assert_eq!(
            pairs,
            vec![
                OutputPair::new("expected_standard_name", "actual_standard_name"),
                OutputPair::new("expected_single_node_name", "actual_single_node_name"),
                OutputPair::new(
                    "expected_high_concurrency_name",
                    "actual_high_concurrency_name"
                ),
            ]
        );
    }

    #[test]
    fn test_discover_keeps_half_declared_pairs() {
        let outputs: OutputSet = [
            ("expected_standard_name", "a"),
            ("actual_standard_name", "a"),
            ("expected_orphan", "b"),
            ("actual_stray", "c"),
            ("cluster_id", "0101-abc"),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            OutputPair::discover(&outputs),
            vec![
                OutputPair::for_suffix("orphan"),
                OutputPair::for_suffix("standard_name"),
                OutputPair::for_suffix("stray"),
            ]
        );
    }

    #[test]
    fn test_discover_requires_at_least_one_pair() {
        let outputs: OutputSet = [("cluster_id", "0101-abc")].into_iter().collect();
        assert!(PairSelection::Discover.resolve(&outputs).is_err());
    }

    #[test]
    fn test_parse_scenario_yaml() {
        let yaml = r#"
name: databricks-naming
description: Naming convention holds for all cluster modes
fixture: ../fixtures/simple-databricks-cluster
vars:
  environment: prod
var_files:
  - ci.tfvars
env:
  DATABRICKS_HOST: https://adb-123.azuredatabricks.net
pairs:
  - expected: expected_standard_name
    actual: actual_standard_name
"#;
        let mut config = Config::default();
        config
            .env
            .insert("DATABRICKS_TOKEN".to_string(), "dapi-test".to_string());

        let scenario = Scenario::from_yaml(yaml, Path::new("/repo/scenarios"), &config).unwrap();

        assert_eq!(scenario.name, "databricks-naming");
        assert_eq!(
            scenario.run.fixture_dir,
            PathBuf::from("/repo/scenarios/../fixtures/simple-databricks-cluster")
        );
        assert_eq!(
            scenario.run.var_files,
            vec![PathBuf::from("/repo/scenarios/ci.tfvars")]
        );
        assert_eq!(scenario.run.vars.get("environment").map(String::as_str), Some("prod"));
        assert_eq!(scenario.run.env.len(), 2);
        assert_eq!(
            scenario.pairs,
            PairSelection::Explicit(vec![OutputPair::for_suffix("standard_name")])
        );
    }

    #[test]
    fn test_scenario_without_pairs_discovers_them() {
        let yaml = "name: auto\nfixture: fixture\n";
        let scenario = Scenario::from_yaml(yaml, Path::new("."), &Config::default()).unwrap();
        assert_eq!(scenario.pairs, PairSelection::Discover);
    }

    #[test]
    fn test_empty_pair_list_is_rejected() {
        let yaml = "name: empty\nfixture: fixture\npairs: []\n";
        assert!(Scenario::from_yaml(yaml, Path::new("."), &Config::default()).is_err());
    }

    #[test]
    fn test_bundled_scenario_matches_builtin() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("scenarios")
            .join("simple-databricks-cluster.yaml");
        let scenario = Scenario::load(&path, &Config::default()).unwrap();

        assert_eq!(
            scenario.pairs,
            PairSelection::Explicit(simple_databricks_cluster_pairs())
        );
        assert!(scenario
            .run
            .fixture_dir
            .ends_with("../fixtures/simple-databricks-cluster"));
    }

    #[test]
    fn test_unknown_scenario_fields_are_rejected() {
        let yaml = "name: typo\nfixture: fixture\npair: []\n";
        assert!(Scenario::from_yaml(yaml, Path::new("."), &Config::default()).is_err());
    }
}
