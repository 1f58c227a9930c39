//! Error types for hrtimerctl

use hrtimer_tester::{Completion, HarnessError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Cannot read config file {}: {source}", path.display())]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Run {completion}: recorded {recorded} of {planned} samples")]
    IncompleteRun {
        completion: Completion,
        recorded: usize,
        planned: usize,
    },

    #[error(transparent)]
    Harness(#[from] HarnessError),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::InvalidConfiguration(_)
            | CliError::ConfigFile { .. }
            | CliError::JsonError(_)
            | CliError::YamlError(_)
            | CliError::Harness(HarnessError::InvalidConfiguration(_)) => 4,
            CliError::IncompleteRun { .. } => 3,
            CliError::Harness(HarnessError::RecorderOverflow { .. }) => 2,
            _ => 1,
        }
    }
}
