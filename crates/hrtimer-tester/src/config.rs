//! Harness configuration.
//!
//! Configurations are plain data with serde support so the CLI can load
//! them from YAML or JSON. Every duration is stored as an integer count
//! (nanoseconds, or whole policy units) to keep the arithmetic exact.

use crate::error::{HarnessError, HarnessResult};
use crate::report::{duration_nanos, option_duration_nanos};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Nested outer/inner sweep parameters (Policy A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NestedSweepConfig {
    /// First outer scale, in `unit`s.
    pub start: u64,
    /// Last outer scale (inclusive), in `unit`s.
    pub outer_end: u64,
    /// Length of one unit.
    #[serde(rename = "unit_ns", with = "duration_nanos")]
    pub unit: Duration,
}

impl Default for NestedSweepConfig {
    fn default() -> Self {
        Self {
            start: crate::DEFAULT_SWEEP_START,
            outer_end: crate::DEFAULT_SWEEP_OUTER_END,
            unit: crate::DEFAULT_SWEEP_UNIT,
        }
    }
}

impl NestedSweepConfig {
    /// Outer scales visited by the sweep, smallest first.
    pub fn scales(&self) -> impl Iterator<Item = u64> + '_ {
        std::iter::successors(Some(self.start), |scale| scale.checked_mul(10))
            .take_while(|scale| *scale <= self.outer_end)
    }

    /// Exclusive inner-loop end for `scale`.
    ///
    /// The final scale runs one extra step so the upper bound itself is
    /// measured.
    pub fn inner_end(&self, scale: u64) -> Option<u64> {
        let factor = if scale < self.outer_end { 10 } else { 11 };
        scale.checked_mul(factor)
    }

    /// Number of samples the sweep records.
    pub fn planned_samples(&self) -> usize {
        self.scales()
            .map(|scale| if scale < self.outer_end { 9 } else { 10 })
            .sum()
    }

    fn validate(&self) -> HarnessResult {
        if self.unit.is_zero() {
            return Err(HarnessError::invalid_configuration(
                "nested sweep unit must be greater than 0",
            ));
        }
        if self.start == 0 {
            return Err(HarnessError::invalid_configuration(
                "nested sweep start must be greater than 0",
            ));
        }
        if self.outer_end < self.start {
            return Err(HarnessError::invalid_configuration(
                "nested sweep outer_end must not be below start",
            ));
        }
        let largest = self.outer_end.checked_mul(11).ok_or_else(|| {
            HarnessError::invalid_configuration("nested sweep outer_end is too large")
        })?;
        let unit_ns = crate::clock::duration_to_nanos(self.unit);
        if largest.checked_mul(unit_ns).is_none() {
            return Err(HarnessError::invalid_configuration(
                "nested sweep delays overflow the nanosecond range",
            ));
        }
        Ok(())
    }
}

/// Geometric step sweep parameters (Policy B).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometricConfig {
    /// First requested delay.
    #[serde(rename = "start_ns", with = "duration_nanos")]
    pub start: Duration,
    /// Delay at or beyond which the sweep finishes its last level.
    #[serde(rename = "end_ns", with = "duration_nanos")]
    pub end: Duration,
    /// Consecutive expirations per delay level.
    pub steps_per_level: u32,
    /// Integer multiplier applied between levels.
    pub growth_factor: u32,
}

impl Default for GeometricConfig {
    fn default() -> Self {
        Self {
            start: Duration::from_nanos(100),
            end: Duration::from_secs(1),
            steps_per_level: 5,
            growth_factor: 2,
        }
    }
}

impl GeometricConfig {
    /// Delay levels visited by the sweep, in nanoseconds.
    ///
    /// The last level is the first one at or beyond `end`. Returns `None`
    /// when reaching it would overflow.
    pub fn levels(&self) -> Option<Vec<u64>> {
        let end = crate::clock::duration_to_nanos(self.end);
        let mut delay = crate::clock::duration_to_nanos(self.start);
        let mut levels = vec![delay];
        while delay < end {
            delay = delay.checked_mul(u64::from(self.growth_factor))?;
            levels.push(delay);
        }
        Some(levels)
    }

    /// Number of samples the sweep records.
    pub fn planned_samples(&self) -> usize {
        let steps = usize::try_from(self.steps_per_level).unwrap_or(usize::MAX);
        self.levels()
            .map_or(0, |levels| levels.len().saturating_mul(steps))
    }

    fn validate(&self) -> HarnessResult {
        if self.start.is_zero() {
            return Err(HarnessError::invalid_configuration(
                "geometric start must be greater than 0",
            ));
        }
        if self.end < self.start {
            return Err(HarnessError::invalid_configuration(
                "geometric end must not be below start",
            ));
        }
        if self.steps_per_level == 0 {
            return Err(HarnessError::invalid_configuration(
                "geometric steps_per_level must be greater than 0",
            ));
        }
        if self.growth_factor < 2 {
            return Err(HarnessError::invalid_configuration(
                "geometric growth_factor must be at least 2",
            ));
        }
        if self.levels().is_none() {
            return Err(HarnessError::invalid_configuration(
                "geometric delays overflow the nanosecond range",
            ));
        }
        Ok(())
    }
}

/// Which delay progression drives the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyConfig {
    /// Logarithmic outer scales, each with a linear inner sweep.
    NestedSweep(NestedSweepConfig),
    /// One chain whose delay grows geometrically every few expirations.
    Geometric(GeometricConfig),
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self::NestedSweep(NestedSweepConfig::default())
    }
}

impl PolicyConfig {
    /// Exact recorder capacity for a run under this policy.
    pub fn planned_samples(&self) -> usize {
        match self {
            Self::NestedSweep(sweep) => sweep.planned_samples(),
            Self::Geometric(geometric) => geometric.planned_samples(),
        }
    }

    /// Validate the policy parameters.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::InvalidConfiguration`] for zero, inverted or
    /// overflowing parameters, and for plans longer than
    /// [`MAX_PLANNED_SAMPLES`](crate::MAX_PLANNED_SAMPLES).
    pub fn validate(&self) -> HarnessResult {
        match self {
            Self::NestedSweep(sweep) => sweep.validate()?,
            Self::Geometric(geometric) => geometric.validate()?,
        }

        let planned = self.planned_samples();
        if planned > crate::MAX_PLANNED_SAMPLES {
            return Err(HarnessError::invalid_configuration(format!(
                "run plans {planned} samples, more than the limit of {}",
                crate::MAX_PLANNED_SAMPLES
            )));
        }
        Ok(())
    }
}

/// Tuning for [`ThreadTimer`](crate::timer::ThreadTimer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Final stretch before a deadline that is busy-spun instead of slept.
    #[serde(rename = "spin_threshold_ns", with = "duration_nanos")]
    pub spin_threshold: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            spin_threshold: Duration::from_micros(80),
        }
    }
}

/// Complete configuration for one chain run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Delay progression.
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Timer backend tuning.
    #[serde(default)]
    pub timer: TimerConfig,
    /// Upper bound on each sub-chain wait. `None` waits indefinitely.
    #[serde(rename = "wait_timeout_ns", default, with = "option_duration_nanos")]
    pub wait_timeout: Option<Duration>,
}

impl HarnessConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> HarnessResult {
        self.policy.validate()?;
        if self.wait_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(HarnessError::invalid_configuration(
                "wait_timeout must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> HarnessConfigBuilder {
        HarnessConfigBuilder::default()
    }
}

/// Builder for [`HarnessConfig`].
#[derive(Debug, Default)]
pub struct HarnessConfigBuilder {
    config: HarnessConfig,
}

impl HarnessConfigBuilder {
    /// Use a nested sweep from `start` to `outer_end` units.
    #[must_use]
    pub fn nested_sweep(mut self, start: u64, outer_end: u64, unit: Duration) -> Self {
        self.config.policy = PolicyConfig::NestedSweep(NestedSweepConfig {
            start,
            outer_end,
            unit,
        });
        self
    }

    /// Use a geometric sweep.
    #[must_use]
    pub fn geometric(
        mut self,
        start: Duration,
        end: Duration,
        steps_per_level: u32,
        growth_factor: u32,
    ) -> Self {
        self.config.policy = PolicyConfig::Geometric(GeometricConfig {
            start,
            end,
            steps_per_level,
            growth_factor,
        });
        self
    }

    /// Bound each sub-chain wait.
    #[must_use]
    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.config.wait_timeout = Some(timeout);
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> HarnessResult<HarnessConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
