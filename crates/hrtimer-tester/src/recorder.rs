//! Fixed-capacity sample log written from the timer callback.
//!
//! The recorder is sized exactly to the number of samples the active
//! sequencer plans to produce. Writes past that capacity are a sequencer
//! bug and are reported as [`RecorderError::Overflow`], never dropped.
//!
//! # RT-Safety
//!
//! - Storage is preallocated at construction
//! - `record` is O(1) and never allocates
//! - No internal locking; the chain driver guarantees a single writer

use crate::error::RecorderError;
use crate::report::duration_nanos;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Label attached to a sample by the active delay policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Marker {
    /// Inner-loop index of a nested sweep, in configured delay units.
    Index(u64),
    /// Requested delay of a geometric sweep.
    Delay(#[serde(with = "duration_nanos")] Duration),
}

impl Marker {
    /// Integer value of the marker as shown in listings.
    ///
    /// Indices are returned as-is, delays as nanoseconds.
    pub fn value(self) -> u64 {
        match self {
            Self::Index(index) => index,
            Self::Delay(delay) => crate::clock::duration_to_nanos(delay),
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// One measured expiration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// What the policy asked for.
    pub expected: Marker,
    /// Actual time between the previous mark and this expiration.
    #[serde(rename = "measured_ns", with = "duration_nanos")]
    pub measured: Duration,
    /// The clock stepped backwards; `measured` was clamped to zero.
    #[serde(default)]
    pub suspect: bool,
}

/// Append-only sample log with a hard capacity.
#[derive(Debug, Clone)]
pub struct SampleRecorder {
    capacity: usize,
    samples: Vec<Sample>,
}

impl SampleRecorder {
    /// Create a recorder holding exactly `capacity` samples.
    ///
    /// # RT-Safety
    ///
    /// Allocates. Call during run setup only.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            samples: Vec::with_capacity(capacity),
        }
    }

    /// Append a sample at the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::Overflow`] when the recorder is already full.
    #[inline]
    pub fn record(&mut self, sample: Sample) -> Result<(), RecorderError> {
        if self.samples.len() >= self.capacity {
            return Err(RecorderError::Overflow {
                capacity: self.capacity,
            });
        }
        self.samples.push(sample);
        Ok(())
    }

    /// Recorded samples in chronological order.
    #[inline]
    pub fn snapshot(&self) -> &[Sample] {
        &self.samples
    }

    /// Number of samples written so far (the cursor).
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether nothing has been recorded yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Planned number of samples.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Discard all samples and resize for a new run.
    pub fn reset(&mut self, capacity: usize) {
        self.samples.clear();
        if capacity > self.samples.capacity() {
            self.samples.reserve_exact(capacity);
        }
        self.capacity = capacity;
    }

    /// Consume the recorder, returning its samples.
    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }
}
