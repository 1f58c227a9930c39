//! hrtimerctl - High-resolution timer calibration CLI
//!
//! Runs a timer-chain sweep against the host's timer facility and prints
//! the measured interval for every requested delay.

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

mod commands;
mod error;
mod output;
mod settings;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::CliError;
use crate::settings::RunArgs;

#[derive(Parser)]
#[command(name = "hrtimerctl")]
#[command(about = "High-resolution timer calibration - sweep delays and record timer latency")]
#[command(version)]
#[command(long_about = "
hrtimerctl arms a single-shot timer repeatedly, re-arming it from each
expiration with the next delay of a sweep, and records how long every
interval actually took. The listing shows requested versus measured
intervals so timer latency and jitter can be read off directly.

Use --json flag for machine-readable output suitable for scripting.
")]
struct Cli {
    /// Output format (human-readable or JSON)
    #[arg(
        long,
        global = true,
        help = "Output in JSON format for machine parsing"
    )]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one timer chain and print the sampled intervals
    Run(RunArgs),

    /// Show the sub-chains and sample count a run would produce
    Plan(RunArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("hrtimerctl={log_level},hrtimer_tester={log_level}").into()
            }),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let result = execute_command(&cli);

    match result {
        Ok(()) => Ok(()),
        Err(e) => {
            let cli_error = e.downcast_ref::<CliError>();
            let reported = matches!(cli_error, Some(CliError::IncompleteRun { .. }));
            if cli.json && !reported {
                output::print_error_json(&e);
            } else if !cli.json {
                output::print_error_human(&e);
            }

            std::process::exit(cli_error.map_or(1, CliError::exit_code));
        }
    }
}

fn execute_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Run(args) => commands::run(args, cli.json),
        Commands::Plan(args) => commands::plan(args, cli.json),
    }
}
