//! Adaptive timer-chain scheduler and sample recorder for characterizing
//! high-resolution timer latency.
//!
//! A run arms a single-shot timer, and every expiration measures the time
//! actually elapsed since the previous one, records it against the delay
//! that was requested, and re-arms forward from now with the next delay.
//! Sweeping the requested delay from microseconds to seconds exposes the
//! latency and jitter profile of the underlying timer facility.
//!
//! - **Delay sequencers**: nested outer/inner sweep or geometric steps
//! - **SampleRecorder**: fixed-capacity, allocation-free sample log
//! - **ChainDriver**: arms, waits, cancels, and reports
//! - **ThreadTimer**: condition-variable sleep with a busy-spin tail
//!
//! # RT-Safety Guarantees
//!
//! The expiry callback performs one clock read, one sequencer transition, at
//! most one append to preallocated storage, and one re-arm or completion
//! signal. It never allocates, logs or waits.
//!
//! # Example
//!
//! ```no_run
//! use hrtimer_tester::{ChainDriver, HarnessConfig};
//!
//! # fn main() -> Result<(), hrtimer_tester::HarnessError> {
//! let config = HarnessConfig::default();
//! let mut driver = ChainDriver::with_thread_timer(config.timer);
//! let report = driver.run(&config)?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

pub mod barrier;
pub mod clock;
pub mod config;
pub mod driver;
pub mod error;
pub mod recorder;
pub mod report;
pub mod sequencer;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod timer;

pub mod prelude;

pub use barrier::{CompletionBarrier, InterruptHandle, WaitOutcome};
pub use clock::{ClockSource, MonotonicClock, Timestamp};
pub use config::{GeometricConfig, HarnessConfig, NestedSweepConfig, PolicyConfig, TimerConfig};
pub use driver::ChainDriver;
pub use error::{HarnessError, HarnessResult, RecorderError};
pub use recorder::{Marker, Sample, SampleRecorder};
pub use report::{Completion, RunReport, format_nanos, format_sample_line, parse_nanos};
pub use sequencer::{DelaySequencer, Expiry, PolicyKind};
pub use timer::{ExpiryHandler, ThreadTimer, TimerPrimitive, TimerRestart};

use std::time::Duration;

/// First outer scale of the default nested sweep (10 µs).
pub const DEFAULT_SWEEP_START: u64 = 10;

/// Last outer scale of the default nested sweep (100 ms, whose inclusive
/// inner loop reaches 1 s).
pub const DEFAULT_SWEEP_OUTER_END: u64 = 100_000;

/// Unit of the default nested sweep.
pub const DEFAULT_SWEEP_UNIT: Duration = Duration::from_micros(1);

/// Largest run a configuration may plan.
///
/// The recorder preallocates one slot per planned sample before the first
/// timer is armed, so this bounds the allocation a run makes up front.
pub const MAX_PLANNED_SAMPLES: usize = 1_000_000;
