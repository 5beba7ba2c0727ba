//! tfscenario - deploy a Terraform fixture, compare its outputs, destroy it

use clap::Parser;
use tfscenario::commands::Commands;
use tfscenario::{cli, common::logging};

#[derive(Parser)]
#[command(name = "tfscenario", about = "Terraform fixture scenario runner")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let verbose = matches!(cli.command, Commands::Test { verbose: true, .. });
    logging::init_cli(verbose);

    if let Err(e) = cli::dispatch(cli.command).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
