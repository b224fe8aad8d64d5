//! PCA-CD configuration.
//!
//! `PcaCdConfig` deserializes from JSON with per-field defaults, so a config
//! file only needs `window_size`. The derived quantities (evaluation step,
//! monitor threshold, histogram bins) are computed here and nowhere else.

use serde::{Deserialize, Serialize};

use crate::distribution::density::DensityKind;
use crate::distribution::divergence::DivergenceMetric;
use crate::error::{DriftError, Result};

/// Upper bound on the evaluation cadence, in observations.
pub const MAX_STEP: usize = 100;

/// PCA-CD configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PcaCdConfig {
    /// Length of both the reference and the test window.
    pub window_size: usize,
    /// Cumulative explained-variance ratio the kept components must reach.
    #[serde(default = "default_ev_threshold")]
    pub ev_threshold: f64,
    /// Sensitivity of the internal Page-Hinkley monitor.
    #[serde(default = "default_delta")]
    pub delta: f64,
    #[serde(default)]
    pub density: DensityKind,
    #[serde(default)]
    pub divergence_metric: DivergenceMetric,
    /// Evaluation cadence as a fraction of `window_size` (capped at
    /// [`MAX_STEP`] observations).
    #[serde(default = "default_sample_period")]
    pub sample_period: f64,
    /// Standardize features on the reference window before projecting.
    #[serde(default)]
    pub online_scaling: bool,
    /// Keep a monitor snapshot for every drift event.
    #[serde(default)]
    pub track_state: bool,
    /// Divide KL and intersection scores by the number of density entries.
    #[serde(default)]
    pub per_entry_scores: bool,
    /// Divide each projected column by its reference-window standard
    /// deviation before estimating densities.
    #[serde(default)]
    pub standardize_components: bool,
    /// Sort each projected column before estimating densities, so reference
    /// and test entries are paired by rank instead of by window position.
    #[serde(default)]
    pub rank_align: bool,
}

fn default_ev_threshold() -> f64 {
    0.99
}

fn default_delta() -> f64 {
    0.1
}

fn default_sample_period() -> f64 {
    0.05
}

impl PcaCdConfig {
    /// Defaults for everything except the window size.
    #[must_use]
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size,
            ev_threshold: default_ev_threshold(),
            delta: default_delta(),
            density: DensityKind::default(),
            divergence_metric: DivergenceMetric::default(),
            sample_period: default_sample_period(),
            online_scaling: false,
            track_state: false,
            per_entry_scores: false,
            standardize_components: false,
            rank_align: false,
        }
    }

    #[must_use]
    pub fn with_density(mut self, density: DensityKind) -> Self {
        self.density = density;
        self
    }

    #[must_use]
    pub fn with_divergence(mut self, metric: DivergenceMetric) -> Self {
        self.divergence_metric = metric;
        self
    }

    #[must_use]
    pub fn with_sample_period(mut self, sample_period: f64) -> Self {
        self.sample_period = sample_period;
        self
    }

    #[must_use]
    pub fn with_delta(mut self, delta: f64) -> Self {
        self.delta = delta;
        self
    }

    #[must_use]
    pub fn with_ev_threshold(mut self, ev_threshold: f64) -> Self {
        self.ev_threshold = ev_threshold;
        self
    }

    #[must_use]
    pub fn with_online_scaling(mut self, enabled: bool) -> Self {
        self.online_scaling = enabled;
        self
    }

    #[must_use]
    pub fn with_track_state(mut self, enabled: bool) -> Self {
        self.track_state = enabled;
        self
    }

    #[must_use]
    pub fn with_per_entry_scores(mut self, enabled: bool) -> Self {
        self.per_entry_scores = enabled;
        self
    }

    #[must_use]
    pub fn with_standardized_components(mut self, enabled: bool) -> Self {
        self.standardize_components = enabled;
        self
    }

    #[must_use]
    pub fn with_rank_alignment(mut self, enabled: bool) -> Self {
        self.rank_align = enabled;
        self
    }

    /// Switch all three score normalizations together. Normalized scores do
    /// not depend on input units or window size and sit well below the
    /// default monitor threshold on stationary data.
    #[must_use]
    pub fn with_normalized_scores(self, enabled: bool) -> Self {
        self.with_per_entry_scores(enabled)
            .with_standardized_components(enabled)
            .with_rank_alignment(enabled)
    }

    /// True when every score normalization is on.
    #[must_use]
    pub fn normalized_scores(&self) -> bool {
        self.per_entry_scores && self.standardize_components && self.rank_align
    }

    /// Reject configurations the detector cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.window_size < 2 {
            return Err(DriftError::InvalidConfig(format!(
                "window_size must be at least 2, got {}",
                self.window_size
            )));
        }
        if !(self.ev_threshold > 0.0 && self.ev_threshold <= 1.0) {
            return Err(DriftError::InvalidConfig(format!(
                "ev_threshold must be in (0, 1], got {}",
                self.ev_threshold
            )));
        }
        if !(self.sample_period.is_finite() && self.sample_period > 0.0) {
            return Err(DriftError::InvalidConfig(format!(
                "sample_period must be positive, got {}",
                self.sample_period
            )));
        }
        if !(self.delta.is_finite() && self.delta >= 0.0) {
            return Err(DriftError::InvalidConfig(format!(
                "delta must be a non-negative number, got {}",
                self.delta
            )));
        }
        Ok(())
    }

    /// Observations between two evaluations: `min(100, round(sample_period *
    /// window_size))`, never below one. Rounds half to even.
    #[must_use]
    pub fn step(&self) -> usize {
        let raw = (self.sample_period * self.window_size as f64).round_ties_even();
        (raw.max(1.0) as usize).min(MAX_STEP)
    }

    /// Alarm threshold handed to the internal monitor: `round(0.01 *
    /// window_size)`.
    #[must_use]
    pub fn monitor_threshold(&self) -> f64 {
        (0.01 * self.window_size as f64).round_ties_even()
    }

    /// Histogram bin count: `floor(sqrt(window_size))`.
    #[must_use]
    pub fn bins(&self) -> usize {
        ((self.window_size as f64).sqrt().floor() as usize).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_parameters_follow_window_size() {
        let cfg = PcaCdConfig::new(100);
        assert_eq!(cfg.step(), 5);
        assert_eq!(cfg.monitor_threshold(), 1.0);
        assert_eq!(cfg.bins(), 10);

        let big = PcaCdConfig::new(10_000);
        assert_eq!(big.step(), MAX_STEP);
        assert_eq!(big.monitor_threshold(), 100.0);
        assert_eq!(big.bins(), 100);

        // round(0.05 * 10) = round(0.5) = 0, clamped to one.
        assert_eq!(PcaCdConfig::new(10).step(), 1);
        // round(0.05 * 50) = round(2.5) = 2 (half to even).
        assert_eq!(PcaCdConfig::new(50).step(), 2);
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(PcaCdConfig::new(100).validate().is_ok());
        assert!(PcaCdConfig::new(1).validate().is_err());
        assert!(PcaCdConfig::new(100).with_ev_threshold(0.0).validate().is_err());
        assert!(PcaCdConfig::new(100).with_ev_threshold(1.5).validate().is_err());
        assert!(PcaCdConfig::new(100).with_sample_period(0.0).validate().is_err());
        assert!(
            PcaCdConfig::new(100)
                .with_sample_period(f64::NAN)
                .validate()
                .is_err()
        );
        assert!(PcaCdConfig::new(100).with_delta(-0.1).validate().is_err());
    }

    #[test]
    fn deserializes_with_defaults() {
        let cfg: PcaCdConfig = serde_json::from_str(r#"{"window_size": 200}"#).unwrap();
        assert_eq!(cfg, PcaCdConfig::new(200));

        let cfg: PcaCdConfig = serde_json::from_str(
            r#"{"window_size": 50, "density": "kde", "divergence_metric": "llh",
                "online_scaling": true}"#,
        )
        .unwrap();
        assert_eq!(cfg.density, DensityKind::Kernel);
        assert_eq!(cfg.divergence_metric, DivergenceMetric::LogLikelihood);
        assert!(cfg.online_scaling);

        assert!(serde_json::from_str::<PcaCdConfig>(r#"{"window": 5}"#).is_err());
    }

    #[test]
    fn score_normalizations_are_opt_in() {
        let cfg = PcaCdConfig::new(100);
        assert!(!cfg.per_entry_scores);
        assert!(!cfg.standardize_components);
        assert!(!cfg.rank_align);
        assert!(!cfg.normalized_scores());

        let all = cfg.clone().with_normalized_scores(true);
        assert!(all.normalized_scores());
        assert_eq!(all.with_normalized_scores(false), cfg);

        let cfg: PcaCdConfig =
            serde_json::from_str(r#"{"window_size": 100, "rank_align": true}"#).unwrap();
        assert!(cfg.rank_align);
        assert!(!cfg.per_entry_scores && !cfg.standardize_components);
    }
}
