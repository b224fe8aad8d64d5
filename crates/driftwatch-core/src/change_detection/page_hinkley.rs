//! Page-Hinkley cumulative-deviation test (Page 1954, Hinkley 1971).
//!
//! Tracks the cumulative deviation of each observation from the running mean,
//! less a tolerance `delta`:
//!
//! ```text
//! m_t = m_{t-1} + (x_t - m_{t-1}) / t
//! S_t = S_{t-1} + (x_t - m_t - delta)        (upward test)
//! PH_t = S_t - min_{i≤t} S_i
//! ```
//!
//! The downward test mirrors it with `+ delta` and `max S - S_t`. Drift is
//! declared once `PH_t` exceeds `threshold` after the first `burn_in` samples.

use crate::change_detection::{Direction, MonitorSnapshot, ScoreMonitor};
use crate::detector::{DetectorBase, DriftDetector, DriftState};
use crate::error::{DriftError, Result};

/// Page-Hinkley monitor.
#[derive(Debug, Clone)]
pub struct PageHinkley {
    base: DetectorBase,
    /// Minimum amplitude of change that counts.
    delta: f64,
    /// Alarm threshold on the PH statistic.
    threshold: f64,
    /// Samples since reset before an alarm is possible.
    burn_in: u64,
    direction: Direction,
    mean: f64,
    sum_increase: f64,
    min_increase: f64,
    sum_decrease: f64,
    max_decrease: f64,
    statistic: f64,
}

impl PageHinkley {
    #[must_use]
    pub fn new(delta: f64, threshold: f64, burn_in: u64) -> Self {
        Self {
            base: DetectorBase::new(),
            delta,
            threshold,
            burn_in,
            direction: Direction::Positive,
            mean: 0.0,
            sum_increase: 0.0,
            min_increase: 0.0,
            sum_decrease: 0.0,
            max_decrease: 0.0,
            statistic: 0.0,
        }
    }

    #[must_use]
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    #[must_use]
    pub fn delta(&self) -> f64 {
        self.delta
    }

    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Running mean of the samples since reset.
    #[must_use]
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Current PH statistic (the larger side when watching both).
    #[must_use]
    pub fn statistic(&self) -> f64 {
        self.statistic
    }

    fn clear_statistics(&mut self) {
        self.mean = 0.0;
        self.sum_increase = 0.0;
        self.min_increase = 0.0;
        self.sum_decrease = 0.0;
        self.max_decrease = 0.0;
        self.statistic = 0.0;
    }
}

impl Default for PageHinkley {
    fn default() -> Self {
        Self::new(0.01, 20.0, 30)
    }
}

impl DriftDetector for PageHinkley {
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

        let n = self.base.samples_since_reset() as f64;
        self.mean += (x - self.mean) / n;

        self.sum_increase += x - self.mean - self.delta;
        self.min_increase = self.min_increase.min(self.sum_increase);
        self.sum_decrease += x - self.mean + self.delta;
        self.max_decrease = self.max_decrease.max(self.sum_decrease);

        let up = self.sum_increase - self.min_increase;
        let down = self.max_decrease - self.sum_decrease;
        self.statistic = match self.direction {
            Direction::Positive => up,
            Direction::Negative => down,
            Direction::Both => up.max(down),
        };

        let past_burn_in = self.base.samples_since_reset() > self.burn_in;
        let state = if past_burn_in && self.statistic > self.threshold {
            DriftState::Drift
        } else {
            DriftState::Stable
        };
        self.base.set_state(state);
        Ok(state)
    }

    fn reset(&mut self) {
        self.base.reset();
        self.clear_statistics();
    }

    fn base(&self) -> &DetectorBase {
        &self.base
    }
}

impl ScoreMonitor for PageHinkley {
    fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            kind: "page_hinkley".to_string(),
            state: self.base.state(),
            total_samples: self.base.total_samples(),
            samples_since_reset: self.base.samples_since_reset(),
            statistic: self.statistic,
            threshold: self.threshold,
            mean: self.mean,
        }
    }
}
