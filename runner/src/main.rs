use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use crate::config::Peer;

mod config;
mod logger;
mod path;
mod run;

// —————————————————————————————— CLI Parsing ——————————————————————————————— //

#[derive(Parser)]
struct CliArgs {
    #[command(subcommand)]
    command: Subcommands,
}

#[derive(Subcommand)]
enum Subcommands {
    /// Run the demo firmware on the emulated S32K3X8EVB
    Run(RunArgs),
    /// Print the reset state of the board registers
    Dump(DumpArgs),
}

#[derive(Args)]
struct RunArgs {
    #[arg(short, long, action)]
    verbose: bool,
    #[arg(long)]
    /// Number of SPI test cycles
    cycles: Option<usize>,
    #[arg(long, value_enum)]
    /// Device connected to the LPSPI
    peer: Option<Peer>,
    #[arg(long)]
    /// Path to the configuration file to use
    config: Option<PathBuf>,
}

#[derive(Args)]
struct DumpArgs {
    #[arg(long)]
    /// Path to the configuration file to use
    config: Option<PathBuf>,
}

// —————————————————————————————— Entry Point ——————————————————————————————— //

fn main() -> ExitCode {
    let args = CliArgs::parse();
    match args.command {
        Subcommands::Run(args) => run::run(&args),
        Subcommands::Dump(args) => run::dump(&args),
    }
}
