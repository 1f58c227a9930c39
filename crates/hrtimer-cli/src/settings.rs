//! Resolve a harness configuration from a file and command-line overrides.

use clap::{Args, ValueEnum};
use hrtimer_tester::{GeometricConfig, HarnessConfig, NestedSweepConfig, PolicyConfig};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::CliError;

/// Delay policy selectable from the command line.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyArg {
    /// Nested outer/inner sweep
    Sweep,
    /// Geometric step sweep
    Geometric,
}

/// Configuration sources shared by `run` and `plan`.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Configuration file (.yaml, .yml or .json)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Delay policy; replaces the file's policy with defaults when it differs
    #[arg(long, value_enum)]
    pub policy: Option<PolicyArg>,

    /// First delay: outer scale in units (sweep) or nanoseconds (geometric)
    #[arg(long)]
    pub start: Option<u64>,

    /// Last delay: outer end in units (sweep) or nanoseconds (geometric)
    #[arg(long)]
    pub end: Option<u64>,

    /// Length of one sweep unit, in nanoseconds
    #[arg(long, value_name = "NS")]
    pub unit_ns: Option<u64>,

    /// Expirations per delay level (geometric)
    #[arg(long)]
    pub steps: Option<u32>,

    /// Multiplier between delay levels (geometric)
    #[arg(long)]
    pub growth: Option<u32>,

    /// Busy-spin tail before each deadline, in microseconds
    #[arg(long, value_name = "US")]
    pub spin_threshold_us: Option<u64>,

    /// Abandon a sub-chain wait after this many milliseconds
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,
}

/// Build and validate the effective configuration.
pub fn resolve(args: &RunArgs) -> Result<HarnessConfig, CliError> {
    let mut config = match &args.config {
        Some(path) => load(path)?,
        None => HarnessConfig::default(),
    };

    if let Some(policy) = args.policy {
        config.policy = match (policy, config.policy) {
            (PolicyArg::Sweep, current @ PolicyConfig::NestedSweep(_))
            | (PolicyArg::Geometric, current @ PolicyConfig::Geometric(_)) => current,
            (PolicyArg::Sweep, _) => PolicyConfig::NestedSweep(NestedSweepConfig::default()),
            (PolicyArg::Geometric, _) => PolicyConfig::Geometric(GeometricConfig::default()),
        };
    }

    match &mut config.policy {
        PolicyConfig::NestedSweep(sweep) => {
            if args.steps.is_some() || args.growth.is_some() {
                return Err(CliError::InvalidConfiguration(
                    "--steps and --growth apply to the geometric policy only".into(),
                ));
            }
            if let Some(start) = args.start {
                sweep.start = start;
            }
            if let Some(end) = args.end {
                sweep.outer_end = end;
            }
            if let Some(unit) = args.unit_ns {
                sweep.unit = Duration::from_nanos(unit);
            }
        }
        PolicyConfig::Geometric(geometric) => {
            if args.unit_ns.is_some() {
                return Err(CliError::InvalidConfiguration(
                    "--unit-ns applies to the sweep policy only".into(),
                ));
            }
            if let Some(start) = args.start {
                geometric.start = Duration::from_nanos(start);
            }
            if let Some(end) = args.end {
                geometric.end = Duration::from_nanos(end);
            }
            if let Some(steps) = args.steps {
                geometric.steps_per_level = steps;
            }
            if let Some(growth) = args.growth {
                geometric.growth_factor = growth;
            }
        }
    }

    if let Some(spin) = args.spin_threshold_us {
        config.timer.spin_threshold = Duration::from_micros(spin);
    }
    if let Some(timeout) = args.timeout_ms {
        config.wait_timeout = Some(Duration::from_millis(timeout));
    }

    config.validate()?;
    Ok(config)
}

/// Load a configuration file, choosing the format by extension.
fn load(path: &Path) -> Result<HarnessConfig, CliError> {
    let text = fs::read_to_string(path).map_err(|source| CliError::ConfigFile {
        path: path.to_path_buf(),
        source,
    })?;

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml" | "yml") => Ok(serde_yaml::from_str(&text)?),
        Some("json") => Ok(serde_json::from_str(&text)?),
        _ => Err(CliError::InvalidConfiguration(format!(
            "unsupported config file extension: {}",
            path.display()
        ))),
    }
}
