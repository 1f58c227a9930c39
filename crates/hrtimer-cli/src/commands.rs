//! Command implementations

use anyhow::{Context, Result};
use hrtimer_tester::ChainDriver;
use tracing::{debug, info};

use crate::error::CliError;
use crate::output::{self, RunPlan};
use crate::settings::{self, RunArgs};

/// Run one timer chain on the host's thread timer and print the report.
///
/// Ctrl-C interrupts the wait; the samples captured so far are still
/// printed and the command exits as incomplete.
pub fn run(args: &RunArgs, json: bool) -> Result<()> {
    let config = settings::resolve(args)?;
    debug!(?config, "resolved configuration");

    let mut driver = ChainDriver::with_thread_timer(config.timer);
    let interrupt = driver.interrupt_handle();
    ctrlc::set_handler(move || interrupt.interrupt())
        .context("failed to install Ctrl-C handler")?;

    info!(
        planned_samples = config.policy.planned_samples(),
        "running timer chain"
    );
    let report = driver.run(&config).map_err(CliError::from)?;
    output::print_report(&report, json);

    if report.is_complete() {
        Ok(())
    } else {
        Err(CliError::IncompleteRun {
            completion: report.completion,
            recorded: report.samples.len(),
            planned: report.planned_samples,
        }
        .into())
    }
}

/// Print the sub-chains a run would execute without arming a timer.
pub fn plan(args: &RunArgs, json: bool) -> Result<()> {
    let config = settings::resolve(args)?;
    output::print_plan(&RunPlan::new(&config), json);
    Ok(())
}
