//! Tabular CUSUM (Page 1954) on standardized observations.
//!
//! ```text
//! z_t  = (x_t - target) / sd
//! S⁺_t = max(0, S⁺_{t-1} + z_t - delta)
//! S⁻_t = max(0, S⁻_{t-1} - z_t - delta)
//! ```
//!
//! When no target is supplied, `target` and `sd` are estimated from the first
//! `burn_in` samples after each reset (Welford). No alarm is possible while
//! that estimate is being built.

use tracing::warn;

use crate::change_detection::{Direction, MonitorSnapshot, ScoreMonitor};
use crate::detector::{DetectorBase, DriftDetector, DriftState};
use crate::error::{DriftError, Result};

/// Floor for the estimated standard deviation.
const MIN_SD: f64 = 1e-12;

/// Welford accumulator for the burn-in estimate.
#[derive(Debug, Clone, Copy, Default)]
struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    /// Sample standard deviation (n - 1).
    fn sd(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / (self.count - 1) as f64).sqrt()
        }
    }
}

/// CUSUM monitor.
#[derive(Debug, Clone)]
pub struct Cusum {
    base: DetectorBase,
    threshold: f64,
    /// Slack subtracted from each standardized deviation.
    delta: f64,
    burn_in: u64,
    direction: Direction,
    /// User-supplied `(target, sd)`; survives resets.
    fixed_target: Option<(f64, f64)>,
    /// `(target, sd)` in use for the current run.
    target: Option<(f64, f64)>,
    burn_in_stats: RunningStats,
    upper: f64,
    lower: f64,
}

impl Cusum {
    #[must_use]
    pub fn new(threshold: f64, delta: f64, burn_in: u64) -> Self {
        Self {
            base: DetectorBase::new(),
            threshold,
            delta,
            burn_in,
            direction: Direction::Both,
            fixed_target: None,
            target: None,
            burn_in_stats: RunningStats::default(),
            upper: 0.0,
            lower: 0.0,
        }
    }

    /// Use a known in-control mean and standard deviation instead of a burn-in.
    #[must_use]
    pub fn with_target(mut self, target: f64, sd: f64) -> Self {
        let pair = (target, sd.abs().max(MIN_SD));
        self.fixed_target = Some(pair);
        self.target = Some(pair);
        self
    }

    #[must_use]
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// `(target, sd)` once known.
    #[must_use]
    pub fn target(&self) -> Option<(f64, f64)> {
        self.target
    }

    /// Upper and lower cumulative sums.
    #[must_use]
    pub fn sums(&self) -> (f64, f64) {
        (self.upper, self.lower)
    }

    fn statistic(&self) -> f64 {
        match self.direction {
            Direction::Positive => self.upper,
            Direction::Negative => self.lower,
            Direction::Both => self.upper.max(self.lower),
        }
    }
}

impl Default for Cusum {
    fn default() -> Self {
        Self::new(5.0, 0.005, 30)
    }
}

impl DriftDetector for Cusum {
    type Input = f64;

    fn update(&mut self, input: &f64) -> Result<DriftState> {
        let x = *input;
        if !x.is_finite() {
            return Err(DriftError::NonFiniteValue { index: 0 });
        }
        if self.base.state().is_drift() {
            self.reset();
        }
        self.base.update();

        let Some((target, sd)) = self.target else {
            self.burn_in_stats.push(x);
            if self.burn_in_stats.count >= self.burn_in.max(2) {
                let sd = self.burn_in_stats.sd();
                if sd < MIN_SD {
                    warn!(
                        samples = self.burn_in_stats.count,
                        "cusum burn-in window has zero variance"
                    );
                }
                self.target = Some((self.burn_in_stats.mean, sd.max(MIN_SD)));
            }
            return Ok(self.base.state());
        };

        let z = (x - target) / sd;
        self.upper = (self.upper + z - self.delta).max(0.0);
        self.lower = (self.lower - z - self.delta).max(0.0);

        let fired = (self.direction.watches_increase() && self.upper > self.threshold)
            || (self.direction.watches_decrease() && self.lower > self.threshold);
        let state = if fired {
            DriftState::Drift
        } else {
            DriftState::Stable
        };
        self.base.set_state(state);
        Ok(state)
    }

    fn reset(&mut self) {
        self.base.reset();
        self.target = self.fixed_target;
        self.burn_in_stats = RunningStats::default();
        self.upper = 0.0;
        self.lower = 0.0;
    }

    fn base(&self) -> &DetectorBase {
        &self.base
    }
}

impl ScoreMonitor for Cusum {
    fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            kind: "cusum".to_string(),
            state: self.base.state(),
            total_samples: self.base.total_samples(),
            samples_since_reset: self.base.samples_since_reset(),
            statistic: self.statistic(),
            threshold: self.threshold,
            mean: self.target.map_or(self.burn_in_stats.mean, |(t, _)| t),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alternating(i: usize) -> f64 {
        if i % 2 == 0 { 1.0 } else { -1.0 }
    }

    #[test]
    fn estimates_target_after_burn_in() {
        let mut cusum = Cusum::new(5.0, 0.5, 10);
        for i in 0..9 {
            cusum.update(&alternating(i)).unwrap();
            assert!(cusum.target().is_none());
        }
        cusum.update(&alternating(9)).unwrap();
        let (target, sd) = cusum.target().unwrap();
        assert!(target.abs() < 1e-12);
        assert!(sd > 0.9 && sd < 1.1, "sd {sd}");
    }

    #[test]
    fn no_alarm_during_burn_in() {
        let mut cusum = Cusum::new(0.1, 0.0, 30);
        for i in 0..29 {
            let x = if i < 15 { 0.0 } else { 100.0 };
            assert_eq!(cusum.update(&x).unwrap(), DriftState::Stable);
        }
    }

    #[test]
    fn detects_shift_in_both_directions() {
        for shift in [4.0, -4.0] {
            let mut cusum = Cusum::new(5.0, 0.5, 30);
            for i in 0..30 {
                cusum.update(&alternating(i)).unwrap();
            }
            let mut detected = false;
            for _ in 0..10 {
                if cusum.update(&shift).unwrap().is_drift() {
                    detected = true;
                    break;
                }
            }
            assert!(detected, "shift {shift} should be detected");
        }
    }

    #[test]
    fn stable_on_in_control_stream() {
        let mut cusum = Cusum::new(5.0, 0.5, 30);
        for i in 0..1000 {
            assert_eq!(cusum.update(&alternating(i)).unwrap(), DriftState::Stable);
        }
    }

    #[test]
    fn fixed_target_survives_reset() {
        let mut cusum = Cusum::new(3.0, 0.0, 30)
            .with_target(0.0, 1.0)
            .with_direction(Direction::Positive);
        assert_eq!(cusum.update(&2.0).unwrap(), DriftState::Stable);
        assert_eq!(cusum.update(&2.0).unwrap(), DriftState::Drift);
        // The next update resets and reuses the supplied target.
        assert_eq!(cusum.update(&0.0).unwrap(), DriftState::Stable);
        assert_eq!(cusum.samples_since_reset(), 1);
        assert_eq!(cusum.target(), Some((0.0, 1.0)));
        assert_eq!(cusum.sums(), (0.0, 0.0));
    }

    #[test]
    fn positive_direction_ignores_drop() {
        let mut cusum = Cusum::new(3.0, 0.0, 0)
            .with_target(0.0, 1.0)
            .with_direction(Direction::Positive);
        for _ in 0..100 {
            assert_eq!(cusum.update(&-5.0).unwrap(), DriftState::Stable);
        }
        assert!(cusum.snapshot().statistic == 0.0);
    }
}
