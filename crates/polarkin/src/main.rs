use anyhow::Result;
use clap::{Parser, Subcommand};

mod cli;
mod config;
mod plan;

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Simulate(args) => args.run(),
    }
}

#[derive(Parser)]
#[command(name = "polarkin", about = "Step generation for polar printers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a move list through polar steppers and report the generated steps.
    Simulate(cli::simulate::SimulateArgs),
}
