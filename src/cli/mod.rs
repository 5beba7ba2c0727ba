//! CLI command handling
//!
//! Builds run configurations from the config file and dispatches commands.

use std::path::PathBuf;

use colored::Colorize;

use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::provision::{Provisioner, RunConfig, TerraformCli};
use crate::scenario::{self, Scenario, SIMPLE_DATABRICKS_CLUSTER_FIXTURE};

/// Dispatch a CLI command
pub async fn dispatch(command: Commands) -> Result<()> {
    let config = Config::load()?;

    match command {
        Commands::Test {
            path,
            fixture,
            verbose,
        } => {
            let scenario = match path {
                Some(path) => Scenario::load(&path, &config)?,
                None => Scenario::simple_databricks_cluster(
                    fixture.unwrap_or_else(|| PathBuf::from(SIMPLE_DATABRICKS_CLUSTER_FIXTURE)),
                    &config,
                )?,
            };

            let report = scenario::run_scenario(scenario, verbose).await?;
            if report.passed() {
                Ok(())
            } else {
                Err(Error::TestAssertion(format!(
                    "scenario '{}' failed",
                    report.name
                )))
            }
        }

        Commands::Apply { dir, vars } => {
            let terraform = terraform_for(dir, vars, &config)?;
            terraform.check_version().await?;
            scenario::apply(&terraform, terraform.retry_policy()).await?;
            println!(
                "{} Applied {}",
                "✓".green(),
                terraform.fixture_dir().display()
            );
            Ok(())
        }

        Commands::Output { dir, json } => {
            let terraform = terraform_for(dir, Vec::new(), &config)?;
            let outputs = terraform.output_all().await?;

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&outputs.to_redacted_json())?
                );
            } else if outputs.is_empty() {
                println!("No outputs declared");
            } else {
                for (name, value) in outputs.iter() {
                    println!("{} = {}", name, outputs.displayed(name, value));
                }
            }
            Ok(())
        }

        Commands::Destroy { dir, vars } => {
            let terraform = terraform_for(dir, vars, &config)?;
            scenario::destroy(&terraform).await?;
            println!(
                "{} Destroyed {}",
                "✓".green(),
                terraform.fixture_dir().display()
            );
            Ok(())
        }

        Commands::Version => {
            let terraform = terraform_for(PathBuf::from("."), Vec::new(), &config)?;
            let version = terraform.version().await?;
            println!("Terraform v{}", version);
            Ok(())
        }
    }
}

fn terraform_for(dir: PathBuf, vars: Vec<(String, String)>, config: &Config) -> Result<TerraformCli> {
    let mut run = RunConfig::from_config(dir, config)?;
    run.vars.extend(vars);
    run.show_progress = true;
    TerraformCli::new(run)
}
