//! Delay progression policies.
//!
//! A sequencer decides the delay each expiration requests next and when the
//! chain ends. It is consulted once per expiration from the timer callback,
//! so every transition is O(1), allocation-free and integer-only.
//!
//! Two policies are provided:
//!
//! - [`NestedSweep`]: logarithmic outer scales, each an independent
//!   sub-chain sweeping `s, 2s, … 10s` (`11s` on the final scale)
//! - [`GeometricSweep`]: one continuous chain that multiplies its delay by a
//!   fixed factor after every `k` expirations
//!
//! Termination is always decided before any re-arm.

use crate::config::{GeometricConfig, NestedSweepConfig, PolicyConfig};
use crate::recorder::Marker;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Decision taken by a sequencer for one expiration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Record a sample labelled `marker`, then re-arm with `next_delay`.
    Continue {
        /// Label for the interval that just elapsed.
        marker: Marker,
        /// Delay for the next expiration, forward from now.
        next_delay: Duration,
    },
    /// Record a sample labelled `marker` and end the chain.
    Finish {
        /// Label for the interval that just elapsed.
        marker: Marker,
    },
    /// End the chain without recording.
    Terminate,
}

/// Policy identifier carried in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Nested outer/inner sweep.
    NestedSweep,
    /// Geometric step sweep.
    Geometric,
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyKind::NestedSweep => write!(f, "nested sweep"),
            PolicyKind::Geometric => write!(f, "geometric"),
        }
    }
}

/// Nested outer/inner sweep state.
#[derive(Debug, Clone)]
pub struct NestedSweep {
    config: NestedSweepConfig,
    unit_ns: u64,
    next_scale: Option<u64>,
    scale: u64,
    inner_index: u64,
    inner_end: u64,
}

impl NestedSweep {
    /// Create a sweep positioned before its first scale.
    pub fn new(config: NestedSweepConfig) -> Self {
        Self {
            config,
            unit_ns: crate::clock::duration_to_nanos(config.unit),
            next_scale: Some(config.start),
            scale: 0,
            inner_index: 0,
            inner_end: 0,
        }
    }

    /// Start the sub-chain for the next outer scale.
    pub fn begin_chain(&mut self) -> Option<Duration> {
        let scale = self
            .next_scale
            .filter(|scale| *scale <= self.config.outer_end)?;

        self.scale = scale;
        self.inner_index = scale;
        self.inner_end = self.config.inner_end(scale).unwrap_or(u64::MAX);
        self.next_scale = scale.checked_mul(10);

        Some(self.delay_for(scale))
    }

    /// Transition for one expiration of the current scale.
    #[inline]
    pub fn on_expire(&mut self) -> Expiry {
        if self.inner_index >= self.inner_end {
            return Expiry::Terminate;
        }

        let marker = Marker::Index(self.inner_index);
        self.inner_index = self.inner_index.saturating_add(self.scale);

        Expiry::Continue {
            marker,
            next_delay: self.delay_for(self.inner_index),
        }
    }

    /// Current outer scale, in units.
    pub fn scale(&self) -> u64 {
        self.scale
    }

    #[inline]
    fn delay_for(&self, units: u64) -> Duration {
        Duration::from_nanos(units.saturating_mul(self.unit_ns))
    }
}

/// Geometric step sweep state.
#[derive(Debug, Clone)]
pub struct GeometricSweep {
    config: GeometricConfig,
    delay_ns: u64,
    end_ns: u64,
    remaining: u32,
    started: bool,
    finished: bool,
}

impl GeometricSweep {
    /// Create a sweep positioned before its only chain.
    pub fn new(config: GeometricConfig) -> Self {
        Self {
            config,
            delay_ns: crate::clock::duration_to_nanos(config.start),
            end_ns: crate::clock::duration_to_nanos(config.end),
            remaining: config.steps_per_level,
            started: false,
            finished: false,
        }
    }

    /// Start the chain. Only the first call returns a delay.
    pub fn begin_chain(&mut self) -> Option<Duration> {
        if self.started {
            return None;
        }
        self.started = true;
        Some(Duration::from_nanos(self.delay_ns))
    }

    /// Transition for one expiration.
    #[inline]
    pub fn on_expire(&mut self) -> Expiry {
        if self.finished {
            return Expiry::Terminate;
        }

        let marker = Marker::Delay(Duration::from_nanos(self.delay_ns));
        self.remaining = self.remaining.saturating_sub(1);

        if self.remaining == 0 {
            if self.delay_ns >= self.end_ns {
                self.finished = true;
                return Expiry::Finish { marker };
            }
            self.delay_ns = self
                .delay_ns
                .saturating_mul(u64::from(self.config.growth_factor));
            self.remaining = self.config.steps_per_level;
        }

        Expiry::Continue {
            marker,
            next_delay: Duration::from_nanos(self.delay_ns),
        }
    }

    /// Delay currently requested, in nanoseconds.
    pub fn delay_ns(&self) -> u64 {
        self.delay_ns
    }
}

/// Delay sequencer selected by configuration.
#[derive(Debug, Clone)]
pub enum DelaySequencer {
    /// Policy A.
    NestedSweep(NestedSweep),
    /// Policy B.
    Geometric(GeometricSweep),
}

impl DelaySequencer {
    /// Build a fresh sequencer for `policy`.
    pub fn new(policy: &PolicyConfig) -> Self {
        match policy {
            PolicyConfig::NestedSweep(config) => Self::NestedSweep(NestedSweep::new(*config)),
            PolicyConfig::Geometric(config) => Self::Geometric(GeometricSweep::new(*config)),
        }
    }

    /// Which policy this is.
    pub fn kind(&self) -> PolicyKind {
        match self {
            Self::NestedSweep(_) => PolicyKind::NestedSweep,
            Self::Geometric(_) => PolicyKind::Geometric,
        }
    }

    /// Initial delay of the next sub-chain, or `None` once the sweep is done.
    pub fn begin_chain(&mut self) -> Option<Duration> {
        match self {
            Self::NestedSweep(sweep) => sweep.begin_chain(),
            Self::Geometric(sweep) => sweep.begin_chain(),
        }
    }

    /// Transition for one expiration.
    #[inline]
    pub fn on_expire(&mut self) -> Expiry {
        match self {
            Self::NestedSweep(sweep) => sweep.on_expire(),
            Self::Geometric(sweep) => sweep.on_expire(),
        }
    }

    /// Label for the sub-chain in progress: the outer scale for a nested
    /// sweep, the current delay in nanoseconds for a geometric one.
    pub fn current_scale(&self) -> u64 {
        match self {
            Self::NestedSweep(sweep) => sweep.scale(),
            Self::Geometric(sweep) => sweep.delay_ns(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(sweep: &mut DelaySequencer) -> (Vec<u64>, usize) {
        let mut markers = Vec::new();
        let mut expirations = 0;
        loop {
            expirations += 1;
            match sweep.on_expire() {
                Expiry::Continue { marker, .. } => markers.push(marker.value()),
                Expiry::Finish { marker } => {
                    markers.push(marker.value());
                    break;
                }
                Expiry::Terminate => break,
            }
        }
        (markers, expirations)
    }

    #[test]
    fn test_nested_sweep_first_scale() {
        let mut sweep = DelaySequencer::new(&PolicyConfig::NestedSweep(NestedSweepConfig::default()));
        assert_eq!(sweep.begin_chain(), Some(Duration::from_micros(10)));
        assert_eq!(sweep.current_scale(), 10);

        let (markers, expirations) = drain(&mut sweep);
        assert_eq!(markers, vec![10, 20, 30, 40, 50, 60, 70, 80, 90]);
        assert_eq!(expirations, 10);
    }

    #[test]
    fn test_nested_sweep_next_delay_tracks_inner_index() {
        let mut sweep = NestedSweep::new(NestedSweepConfig::default());
        assert!(sweep.begin_chain().is_some());
        assert_eq!(
            sweep.on_expire(),
            Expiry::Continue {
                marker: Marker::Index(10),
                next_delay: Duration::from_micros(20),
            }
        );
    }

    #[test]
    fn test_nested_sweep_final_scale_is_inclusive() {
        let mut sweep = DelaySequencer::new(&PolicyConfig::NestedSweep(NestedSweepConfig {
            start: 10,
            outer_end: 100,
            unit: Duration::from_micros(1),
        }));

        assert!(sweep.begin_chain().is_some());
        let (first, _) = drain(&mut sweep);
        assert_eq!(first.len(), 9);

        assert_eq!(sweep.begin_chain(), Some(Duration::from_micros(100)));
        let (last, expirations) = drain(&mut sweep);
        assert_eq!(last.first(), Some(&100));
        assert_eq!(last.last(), Some(&1_000));
        assert_eq!(last.len(), 10);
        assert_eq!(expirations, 11);

        assert_eq!(sweep.begin_chain(), None);
    }

    #[test]
    fn test_nested_sweep_scale_count() {
        let mut sweep = NestedSweep::new(NestedSweepConfig::default());
        let mut scales = Vec::new();
        while sweep.begin_chain().is_some() {
            scales.push(sweep.scale());
        }
        assert_eq!(scales, vec![10, 100, 1_000, 10_000, 100_000]);
    }

    #[test]
    fn test_geometric_sequence() {
        let mut sweep = GeometricSweep::new(GeometricConfig {
            start: Duration::from_nanos(100),
            end: Duration::from_nanos(400),
            steps_per_level: 2,
            growth_factor: 2,
        });
        assert_eq!(sweep.begin_chain(), Some(Duration::from_nanos(100)));
        assert_eq!(sweep.begin_chain(), None);

        let mut delays = Vec::new();
        loop {
            match sweep.on_expire() {
                Expiry::Continue { marker, .. } => delays.push(marker.value()),
                Expiry::Finish { marker } => {
                    delays.push(marker.value());
                    break;
                }
                Expiry::Terminate => break,
            }
        }
        assert_eq!(delays, vec![100, 100, 200, 200, 400, 400]);
        assert_eq!(sweep.on_expire(), Expiry::Terminate);
    }

    #[test]
    fn test_geometric_rearms_with_updated_delay() {
        let mut sweep = GeometricSweep::new(GeometricConfig {
            start: Duration::from_nanos(100),
            end: Duration::from_nanos(1_000),
            steps_per_level: 1,
            growth_factor: 3,
        });
        assert!(sweep.begin_chain().is_some());
        assert_eq!(
            sweep.on_expire(),
            Expiry::Continue {
                marker: Marker::Delay(Duration::from_nanos(100)),
                next_delay: Duration::from_nanos(300),
            }
        );
    }

    #[test]
    fn test_geometric_start_equals_end_single_step() {
        let mut sweep = DelaySequencer::new(&PolicyConfig::Geometric(GeometricConfig {
            start: Duration::from_micros(5),
            end: Duration::from_micros(5),
            steps_per_level: 1,
            growth_factor: 2,
        }));
        assert!(sweep.begin_chain().is_some());
        let (markers, expirations) = drain(&mut sweep);
        assert_eq!(markers, vec![5_000]);
        assert_eq!(expirations, 1);
    }

    #[test]
    fn test_kind() {
        let sweep = DelaySequencer::new(&PolicyConfig::default());
        assert_eq!(sweep.kind(), PolicyKind::NestedSweep);
        assert_eq!(sweep.kind().to_string(), "nested sweep");
    }
}
