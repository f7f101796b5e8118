use std::error::Error;

use clap::{Parser, Subcommand};
use commands::{
    describe::{self, DescribeArgs},
    sweep::{self, SweepArgs},
};

mod commands;
mod plan;

#[derive(Parser, Debug)]
#[command(name = "mgrid-sim", about = "Model-grid parameter sweep CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute a sweep from a YAML plan.
    Sweep(SweepArgs),
    /// Print the grid a plan would enumerate, without running it.
    Describe(DescribeArgs),
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    match cli.command {
        Command::Sweep(args) => sweep::run(&args),
        Command::Describe(args) => describe::run(&args),
    }
}
