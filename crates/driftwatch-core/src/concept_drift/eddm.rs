//! Early Drift Detection Method (Baena-García et al., 2006).
//!
//! Watches the distance (in samples) between consecutive classification
//! errors. While a classifier is learning, errors get further apart; when the
//! concept drifts they bunch up. With `p` the running mean distance and `s`
//! its standard deviation:
//!
//! ```text
//! ratio = (p + 2s) / max(p + 2s)
//! ratio ≤ drift_thresh    → Drift
//! ratio ≤ warning_thresh  → Warning
//! ```
//!
//! The maximum is only tracked once `n_threshold` errors have been seen.
//! Early estimates are too noisy to anchor it, so during that burn-in the
//! maximum stays at zero and the detector cannot leave `Stable`.

use crate::detector::{DetectorBase, DriftDetector, DriftState};
use crate::error::Result;

/// `(predicted, actual)` class labels for one sample.
pub type Prediction = (i64, i64);

/// EDDM detector.
#[derive(Debug, Clone)]
pub struct Eddm {
    base: DetectorBase,
    n_threshold: u64,
    warning_thresh: f64,
    drift_thresh: f64,
    n_errors: u64,
    /// Index (since reset) of the most recent error.
    index_error_curr: u64,
    index_error_last: u64,
    dist_mean: f64,
    /// Welford sum of squared deviations of the error distance.
    dist_m2: f64,
    max_numerator: f64,
    test_statistic: Option<f64>,
    /// `[first warning index, drift index]` in `total_samples` coordinates.
    retraining_recs: [Option<u64>; 2],
}

impl Eddm {
    #[must_use]
    pub fn new(n_threshold: u64, warning_thresh: f64, drift_thresh: f64) -> Self {
        Self {
            base: DetectorBase::new(),
            n_threshold,
            warning_thresh,
            drift_thresh,
            n_errors: 0,
            index_error_curr: 0,
            index_error_last: 0,
            dist_mean: 0.0,
            dist_m2: 0.0,
            max_numerator: 0.0,
            test_statistic: None,
            retraining_recs: [None, None],
        }
    }

    /// Running standard deviation of the distance between errors.
    #[must_use]
    pub fn dist_std(&self) -> f64 {
        if self.n_errors == 0 {
            0.0
        } else {
            (self.dist_m2 / self.n_errors as f64).sqrt()
        }
    }

    #[must_use]
    pub fn dist_mean(&self) -> f64 {
        self.dist_mean
    }

    /// Largest `p + 2s` seen since burn-in ended. Zero during burn-in.
    #[must_use]
    pub fn max_numerator(&self) -> f64 {
        self.max_numerator
    }

    #[must_use]
    pub fn test_statistic(&self) -> Option<f64> {
        self.test_statistic
    }

    #[must_use]
    pub fn n_errors(&self) -> u64 {
        self.n_errors
    }

    /// Recommended retraining window: `[first warning, drift]`. A drift with
    /// no preceding warning reports the drift index twice (abrupt change).
    #[must_use]
    pub fn retraining_recs(&self) -> [Option<u64>; 2] {
        self.retraining_recs
    }

    fn record_retraining_index(&mut self) {
        let index = self.base.total_samples() - 1;
        match self.base.state() {
            DriftState::Warning => {
                if self.retraining_recs[0].is_none() {
                    self.retraining_recs[0] = Some(index);
                }
            }
            DriftState::Drift => {
                self.retraining_recs[1] = Some(index);
                if self.retraining_recs[0].is_none() {
                    self.retraining_recs[0] = Some(index);
                }
            }
            DriftState::Stable => {}
        }
    }
}

impl Default for Eddm {
    fn default() -> Self {
        Self::new(30, 0.95, 0.9)
    }
}

impl DriftDetector for Eddm {
    type Input = Prediction;

    fn update(&mut self, input: &Prediction) -> Result<DriftState> {
        if self.base.state().is_drift() {
            self.reset();
        }
        self.base.update();

        let (predicted, actual) = *input;
        if predicted == actual {
            return Ok(self.base.state());
        }

        self.n_errors += 1;
        self.index_error_last = self.index_error_curr;
        self.index_error_curr = self.base.samples_since_reset() - 1;
        let dist = (self.index_error_curr - self.index_error_last) as f64;

        let prev_mean = self.dist_mean;
        self.dist_mean += (dist - self.dist_mean) / self.n_errors as f64;
        self.dist_m2 += (dist - self.dist_mean) * (dist - prev_mean);

        if self.n_errors < self.n_threshold {
            return Ok(self.base.state());
        }

        let numerator = self.dist_mean + 2.0 * self.dist_std();
        if numerator > self.max_numerator {
            self.max_numerator = numerator;
        }
        // Back-to-back errors from the start keep both at zero.
        if self.max_numerator <= 0.0 {
            return Ok(self.base.state());
        }
        let ratio = numerator / self.max_numerator;
        self.test_statistic = Some(ratio);

        let state = if ratio <= self.drift_thresh {
            DriftState::Drift
        } else if ratio <= self.warning_thresh {
            DriftState::Warning
        } else {
            DriftState::Stable
        };
        self.base.set_state(state);
        if state.is_alarm() {
            self.record_retraining_index();
        }
        Ok(state)
    }

    fn reset(&mut self) {
        self.base.reset();
        self.n_errors = 0;
        self.index_error_curr = 0;
        self.index_error_last = 0;
        self.dist_mean = 0.0;
        self.dist_m2 = 0.0;
        self.max_numerator = 0.0;
        self.test_statistic = None;
        self.retraining_recs = [None, None];
    }

    fn base(&self) -> &DetectorBase {
        &self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed `samples` predictions with one error every `spacing` samples.
    fn feed(eddm: &mut Eddm, samples: usize, spacing: usize) -> Vec<DriftState> {
        (0..samples)
            .map(|i| {
                let wrong = (i + 1) % spacing == 0;
                let pred = if wrong { (1, 0) } else { (1, 1) };
                eddm.update(&pred).unwrap()
            })
            .collect()
    }

    #[test]
    fn correct_predictions_never_alarm() {
        let mut eddm = Eddm::default();
        assert!(feed(&mut eddm, 500, usize::MAX).iter().all(|s| !s.is_alarm()));
        assert_eq!(eddm.n_errors(), 0);
        assert_eq!(eddm.total_samples(), 500);
    }

    #[test]
    fn burn_in_does_not_update_maximum() {
        let mut eddm = Eddm::default();
        // 29 widely spaced errors, then a tight cluster still inside burn-in.
        feed(&mut eddm, 29 * 50, 50);
        assert_eq!(eddm.n_errors(), 29);
        assert_eq!(eddm.max_numerator(), 0.0);
        assert!(eddm.test_statistic().is_none());
        assert_eq!(eddm.state(), DriftState::Stable);

        feed(&mut eddm, 2, 2);
        assert_eq!(eddm.n_errors(), 30);
        assert!(eddm.max_numerator() > 0.0);
        assert!(eddm.test_statistic().is_some());
    }

    #[test]
    fn stable_while_error_spacing_is_constant() {
        let mut eddm = Eddm::default();
        let states = feed(&mut eddm, 1000, 10);
        assert!(states.iter().all(|s| *s == DriftState::Stable));
        assert!((eddm.dist_mean() - 10.0).abs() < 0.05);
    }

    #[test]
    fn warning_then_drift_when_errors_bunch_up() {
        let mut eddm = Eddm::default();
        feed(&mut eddm, 1000, 10);
        assert_eq!(eddm.state(), DriftState::Stable);

        let mut saw_warning = false;
        let mut drifted = false;
        for state in feed(&mut eddm, 600, 2) {
            match state {
                DriftState::Warning => saw_warning = true,
                DriftState::Drift => {
                    drifted = true;
                    break;
                }
                DriftState::Stable => {}
            }
        }
        assert!(saw_warning, "expected a warning before drift");
        assert!(drifted, "expected drift once errors cluster");

        let [first, drift] = eddm.retraining_recs();
        let (first, drift) = (first.unwrap(), drift.unwrap());
        assert!(first < drift);
        assert!(first >= 1000);
    }

    #[test]
    fn zero_distance_errors_leave_statistic_unset() {
        let mut eddm = Eddm::new(1, 0.95, 0.9);
        assert_eq!(eddm.update(&(1, 0)).unwrap(), DriftState::Stable);
        assert_eq!(eddm.n_errors(), 1);
        assert_eq!(eddm.max_numerator(), 0.0);
        assert_eq!(eddm.test_statistic(), None);

        // The second error is one sample away, so the maximum becomes positive.
        assert_eq!(eddm.update(&(1, 0)).unwrap(), DriftState::Stable);
        let ratio = eddm.test_statistic().unwrap();
        assert!(ratio.is_finite());
        assert_eq!(ratio, 1.0);
    }

    #[test]
    fn drift_resets_on_next_update() {
        let mut eddm = Eddm::default();
        feed(&mut eddm, 1000, 10);
        let mut steps = 0;
        loop {
            let pred = if steps % 2 == 0 { (0, 1) } else { (1, 1) };
            if eddm.update(&pred).unwrap().is_drift() {
                break;
            }
            steps += 1;
            assert!(steps < 2000, "drift never reached");
        }
        let total = eddm.total_samples();
        eddm.update(&(1, 1)).unwrap();
        assert_eq!(eddm.state(), DriftState::Stable);
        assert_eq!(eddm.samples_since_reset(), 1);
        assert_eq!(eddm.total_samples(), total + 1);
        assert_eq!(eddm.retraining_recs(), [None, None]);
        assert_eq!(eddm.n_errors(), 0);
    }
}
