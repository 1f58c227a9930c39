//! Output formatting for CLI responses

use anyhow::Error;
use colored::*;
use hrtimer_tester::clock::duration_to_nanos;
use hrtimer_tester::{HarnessConfig, PolicyConfig, PolicyKind, RunReport, format_nanos};
use serde::Serialize;
use serde_json::json;

/// One sub-chain of a planned run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainPlan {
    /// Delay the sub-chain is armed with, in nanoseconds.
    pub first_delay_ns: u64,
    /// Largest delay that produces a sample, in nanoseconds.
    pub last_sampled_delay_ns: u64,
    /// Samples the sub-chain records.
    pub samples: usize,
}

/// What a run would do, without arming anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunPlan {
    pub policy: PolicyKind,
    pub planned_samples: usize,
    pub chains: Vec<ChainPlan>,
    pub config: HarnessConfig,
}

impl RunPlan {
    pub fn new(config: &HarnessConfig) -> Self {
        let (policy, chains) = match &config.policy {
            PolicyConfig::NestedSweep(sweep) => {
                let unit_ns = duration_to_nanos(sweep.unit);
                let chains = sweep
                    .scales()
                    .map(|scale| {
                        let samples = if scale < sweep.outer_end { 9 } else { 10 };
                        ChainPlan {
                            first_delay_ns: scale.saturating_mul(unit_ns),
                            last_sampled_delay_ns: scale
                                .saturating_mul(samples as u64)
                                .saturating_mul(unit_ns),
                            samples,
                        }
                    })
                    .collect();
                (PolicyKind::NestedSweep, chains)
            }
            PolicyConfig::Geometric(geometric) => {
                let levels = geometric.levels().unwrap_or_default();
                let chains = match (levels.first(), levels.last()) {
                    (Some(&first), Some(&last)) => vec![ChainPlan {
                        first_delay_ns: first,
                        last_sampled_delay_ns: last,
                        samples: geometric.planned_samples(),
                    }],
                    _ => Vec::new(),
                };
                (PolicyKind::Geometric, chains)
            }
        };

        Self {
            policy,
            planned_samples: config.policy.planned_samples(),
            chains,
            config: *config,
        }
    }
}

/// Print error in JSON format
pub fn print_error_json(error: &Error) {
    let error_json = json!({
        "success": false,
        "error": {
            "message": error.to_string(),
        }
    });
    match serde_json::to_string_pretty(&error_json) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("Failed to format error as JSON: {}", e),
    }
}

/// Print error in human-readable format
pub fn print_error_human(error: &Error) {
    eprintln!("{} {}", "Error:".red().bold(), error);

    let mut source = error.source();
    while let Some(err) = source {
        eprintln!("  {} {}", "Caused by:".yellow(), err);
        source = err.source();
    }
}

/// Print a run report in the specified format
pub fn print_report(report: &RunReport, json: bool) {
    if json {
        let output = json!({
            "success": report.is_complete(),
            "report": report
        });
        match serde_json::to_string_pretty(&output) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("Failed to format report as JSON: {}", e),
        }
    } else {
        println!("{report}");
        let suspect = report.suspect_count();
        if suspect > 0 {
            eprintln!(
                "{} {} sample(s) clamped after the clock stepped backwards",
                "Warning:".yellow().bold(),
                suspect
            );
        }
    }
}

/// Print a run plan in the specified format
pub fn print_plan(plan: &RunPlan, json: bool) {
    if json {
        let output = json!({
            "success": true,
            "plan": plan
        });
        match serde_json::to_string_pretty(&output) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("Failed to format plan as JSON: {}", e),
        }
        return;
    }

    println!(
        "{} {} ({} samples planned)",
        "Policy:".bold(),
        plan.policy,
        plan.planned_samples
    );
    for (index, chain) in plan.chains.iter().enumerate() {
        println!(
            "  chain {:2}: {:>13} .. {:>13} uS ({} samples)",
            index + 1,
            format_nanos(chain.first_delay_ns),
            format_nanos(chain.last_sampled_delay_ns),
            chain.samples
        );
    }
    if let Some(timeout) = plan.config.wait_timeout {
        println!("  wait timeout: {} uS", format_nanos(duration_to_nanos(timeout)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_plan_covers_every_scale() {
        let plan = RunPlan::new(&HarnessConfig::default());
        assert_eq!(plan.policy, PolicyKind::NestedSweep);
        assert_eq!(plan.planned_samples, 46);
        assert_eq!(plan.chains.len(), 5);
        assert_eq!(
            plan.chains.last(),
            Some(&ChainPlan {
                first_delay_ns: 100_000_000,
                last_sampled_delay_ns: 1_000_000_000,
                samples: 10,
            })
        );
        let total: usize = plan.chains.iter().map(|c| c.samples).sum();
        assert_eq!(total, plan.planned_samples);
    }

    #[test]
    fn test_geometric_plan_is_one_chain() -> Result<(), hrtimer_tester::HarnessError> {
        let config = HarnessConfig::builder()
            .geometric(Duration::from_nanos(100), Duration::from_nanos(800), 5, 2)
            .build()?;
        let plan = RunPlan::new(&config);
        assert_eq!(
            plan.chains,
            vec![ChainPlan {
                first_delay_ns: 100,
                last_sampled_delay_ns: 800,
                samples: 20,
            }]
        );
        Ok(())
    }
}
