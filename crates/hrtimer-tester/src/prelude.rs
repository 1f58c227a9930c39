//! Prelude module for common harness types.
//!
//! This module provides a convenient way to import the most commonly used
//! types from the harness crate.

pub use crate::barrier::{CompletionBarrier, InterruptHandle, WaitOutcome};
pub use crate::clock::{ClockSource, MonotonicClock, Timestamp};
pub use crate::config::{HarnessConfig, PolicyConfig, TimerConfig};
pub use crate::driver::ChainDriver;
pub use crate::error::{HarnessError, HarnessResult};
pub use crate::recorder::{Marker, Sample};
pub use crate::report::{Completion, RunReport};
pub use crate::timer::{ThreadTimer, TimerPrimitive, TimerRestart};
pub use crate::{DEFAULT_SWEEP_OUTER_END, DEFAULT_SWEEP_START, DEFAULT_SWEEP_UNIT};
