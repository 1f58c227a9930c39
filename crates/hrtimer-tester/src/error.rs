//! Error types for the timer-chain harness.
//!
//! Only setup-time and programming errors surface here. Interrupted or
//! timed-out waits are not errors; they produce an incomplete
//! [`RunReport`](crate::report::RunReport) instead.

use thiserror::Error;

/// Errors that can occur while configuring or driving a timer chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HarnessError {
    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The sequencer produced more samples than the recorder was sized for.
    #[error("Sample recorder overflow: capacity of {capacity} samples exceeded")]
    RecorderOverflow {
        /// Planned capacity of the recorder.
        capacity: usize,
    },

    /// `arm` was called on a timer that is still armed.
    #[error("Timer is already armed")]
    TimerBusy,

    /// The timer backend could not start its expiry context.
    #[error("Failed to start timer backend: {0}")]
    TimerSpawn(String),

    /// The callback found the run context held by another party.
    #[error("Timer callback ran concurrently with the chain driver")]
    OrderingViolation,
}

impl HarnessError {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration(reason.into())
    }

    /// Create a timer spawn error.
    #[must_use]
    pub fn timer_spawn(reason: impl Into<String>) -> Self {
        Self::TimerSpawn(reason.into())
    }
}

/// Errors raised by the sample recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecorderError {
    /// A write was attempted past the preallocated capacity.
    #[error("recorder full at {capacity} samples")]
    Overflow {
        /// Capacity of the recorder.
        capacity: usize,
    },
}

impl From<RecorderError> for HarnessError {
    fn from(err: RecorderError) -> Self {
        match err {
            RecorderError::Overflow { capacity } => Self::RecorderOverflow { capacity },
        }
    }
}

/// A specialized `Result` type for harness operations.
pub type HarnessResult<T = ()> = std::result::Result<T, HarnessError>;
