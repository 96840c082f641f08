//! CLI for batch inference latency benchmarking.

mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use console::style;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use nnbench_core::BenchError;

use commands::{config, run};

/// nnbench - Run every sample in a directory through a model and report latency
#[derive(Parser)]
#[command(name = "nnbench")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the benchmark over an input directory
    Run(run::RunArgs),

    /// Manage configuration
    Config(config::ConfigArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        println!("{} {}", style("ERROR:").red(), e);
        return ExitCode::FAILURE;
    }

    // Execute command
    let result = match cli.command {
        Commands::Run(args) => run::run(args, cli.config.as_deref()),
        Commands::Config(args) => config::run(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("{} {:#}", style("ERROR:").red(), e);
            ExitCode::from(exit_code(&e))
        }
    }
}

fn exit_code(error: &anyhow::Error) -> u8 {
    error
        .downcast_ref::<BenchError>()
        .map(BenchError::exit_code)
        .unwrap_or(1)
}
