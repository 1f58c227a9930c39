//! Monotonic clock source abstraction.
//!
//! Timestamps are fixed-point nanosecond counts relative to the clock's
//! origin. No floating point is involved anywhere on the measurement path.

use std::fmt;
use std::time::{Duration, Instant};

/// A point on a monotonic clock, in nanoseconds since the clock's origin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The clock origin.
    pub const ZERO: Self = Self(0);

    /// Create a timestamp from a nanosecond count.
    #[inline]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Nanoseconds since the clock origin.
    #[inline]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Elapsed time from `earlier` to `self`.
    ///
    /// A clock that steps backwards yields a zero duration flagged as suspect
    /// rather than a negative one.
    #[inline]
    pub fn elapsed_since(self, earlier: Timestamp) -> Elapsed {
        match self.0.checked_sub(earlier.0) {
            Some(nanos) => Elapsed {
                duration: Duration::from_nanos(nanos),
                suspect: false,
            },
            None => Elapsed {
                duration: Duration::ZERO,
                suspect: true,
            },
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// Result of measuring the distance between two timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed {
    /// Measured duration, clamped to zero on a backwards step.
    pub duration: Duration,
    /// Set when the clock was observed going backwards.
    pub suspect: bool,
}

/// Source of monotonic timestamps.
///
/// Implementations must never go backwards for the duration of a run and
/// must be callable from the timer callback context (no blocking).
pub trait ClockSource: Send + Sync {
    /// Read the current time.
    fn now(&self) -> Timestamp;
}

/// Monotonic clock backed by [`std::time::Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Create a clock whose origin is the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSource for MonotonicClock {
    #[inline]
    fn now(&self) -> Timestamp {
        Timestamp(duration_to_nanos(self.origin.elapsed()))
    }
}

/// Convert a duration into whole nanoseconds, saturating at `u64::MAX`.
///
/// `u64` nanoseconds cover more than 584 years, so saturation only matters
/// for nonsensical inputs.
#[inline]
pub fn duration_to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
