//! Run reports and their textual rendering.
//!
//! Durations are stored and serialized as integer nanoseconds. The listing
//! format renders them as `<µs>.<ns>` with exactly three fractional digits,
//! which [`parse_nanos`] inverts without loss.

use crate::recorder::Sample;
use crate::sequencer::PolicyKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// Every sub-chain reached its terminal expiration.
    Completed,
    /// The caller's wait was interrupted; the chain was abandoned.
    Interrupted,
    /// A sub-chain wait exceeded the configured timeout.
    TimedOut,
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completion::Completed => write!(f, "completed"),
            Completion::Interrupted => write!(f, "interrupted"),
            Completion::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Result of one chain run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Policy that drove the run.
    pub policy: PolicyKind,
    /// Whether the run finished or was abandoned.
    pub completion: Completion,
    /// Wall time from the first arm to the final cancel.
    #[serde(rename = "total_elapsed_ns", with = "duration_nanos")]
    pub total_elapsed: Duration,
    /// Samples the policy planned to record.
    pub planned_samples: usize,
    /// Samples actually recorded, in chronological order.
    pub samples: Vec<Sample>,
}

impl RunReport {
    /// Whether the whole chain ran to completion.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.completion == Completion::Completed
    }

    /// Number of samples flagged as suspect.
    pub fn suspect_count(&self) -> usize {
        self.samples.iter().filter(|sample| sample.suspect).count()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_ns = crate::clock::duration_to_nanos(self.total_elapsed);
        match self.completion {
            Completion::Completed => write!(f, "Completed in ~ {total_ns:9} ns.")?,
            Completion::Interrupted | Completion::TimedOut => write!(
                f,
                "Run {} after ~ {total_ns:9} ns ({} of {} samples).",
                self.completion,
                self.samples.len(),
                self.planned_samples
            )?,
        }

        write!(f, "\nSampled values:")?;
        for (index, sample) in self.samples.iter().enumerate() {
            write!(f, "\n{}", format_sample_line(index, sample))?;
        }
        Ok(())
    }
}

/// Render a nanosecond count as microseconds with three fractional digits.
pub fn format_nanos(nanos: u64) -> String {
    format!("{}.{:03}", nanos / 1_000, nanos % 1_000)
}

/// Inverse of [`format_nanos`]. Surrounding whitespace is ignored.
pub fn parse_nanos(text: &str) -> Option<u64> {
    let (micros, frac) = text.trim().split_once('.')?;
    if frac.len() != 3 || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let micros: u64 = micros.parse().ok()?;
    let frac: u64 = frac.parse().ok()?;
    micros.checked_mul(1_000)?.checked_add(frac)
}

/// One line of the sample listing; `index` is zero-based.
pub fn format_sample_line(index: usize, sample: &Sample) -> String {
    let nanos = crate::clock::duration_to_nanos(sample.measured);
    let line = format!(
        " [{:2}] {:7} = {:>11} uS",
        index.saturating_add(1),
        sample.expected.value(),
        format_nanos(nanos)
    );
    if sample.suspect {
        format!("{line} (suspect)")
    } else {
        line
    }
}

/// Serialize a [`Duration`] as integer nanoseconds.
pub mod duration_nanos {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize as `u64` nanoseconds.
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(crate::clock::duration_to_nanos(*duration))
    }

    /// Deserialize from `u64` nanoseconds.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_nanos)
    }
}

/// Serialize an optional [`Duration`] as integer nanoseconds.
pub mod option_duration_nanos {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize as an optional `u64` nanosecond count.
    pub fn serialize<S: Serializer>(
        duration: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match duration {
            Some(duration) => serializer.serialize_some(&crate::clock::duration_to_nanos(*duration)),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize from an optional `u64` nanosecond count.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|nanos| nanos.map(Duration::from_nanos))
    }
}
