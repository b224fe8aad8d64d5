//! PCA-CD: principal-component change detection (Qahtan et al., 2015).
//!
//! Each update pushes one observation through the [`WindowManager`]. Once both
//! windows are built, every `step` observations the test densities are
//! re-estimated, each retained dimension is scored against the frozen
//! reference, and the worst dimension is fed to a scalar [`ScoreMonitor`]
//! (Page-Hinkley by default) whose alarm becomes this detector's `Drift`.
//!
//! ```text
//! step      = min(100, round(sample_period · W))      (at least 1)
//! threshold = round(0.01 · W)                         (monitor alarm level)
//! score_t   = max_d divergence(ref_d, test_d)
//! ```
//!
//! On drift the test window becomes the new reference. The detector and its
//! monitor are reset on the following update, which then starts the new test
//! window.
//!
//! An evaluation that fails (a test column with zero variance under the
//! kernel estimate, say) is returned from `update` after the observation has
//! been counted and slid into the test window. The monitor is not fed and the
//! state is unchanged, so the next update carries on from there.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::change_detection::{MonitorSnapshot, PageHinkley, ScoreMonitor};
use crate::config::PcaCdConfig;
use crate::detector::{DetectorBase, DriftDetector, DriftState};
use crate::distribution::window::{Phase, WindowManager};
use crate::error::Result;

/// Monitor state captured at a drift event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftRecord {
    /// Zero-based index of the observation that triggered drift.
    pub sample: u64,
    /// Reduced divergence score fed to the monitor on that observation.
    pub score: f64,
    pub monitor: MonitorSnapshot,
}

/// Reduce per-dimension scores to one: the worst dimension drives the alarm.
/// Empty input scores zero.
#[must_use]
pub fn worst_dimension(scores: &[f64]) -> f64 {
    scores.iter().copied().fold(0.0, f64::max)
}

/// PCA-CD detector over `Vec<f64>` observations.
#[derive(Debug, Clone)]
pub struct PcaCd<M: ScoreMonitor = PageHinkley> {
    base: DetectorBase,
    config: PcaCdConfig,
    step: u64,
    windows: WindowManager,
    monitor: M,
    last_score: Option<f64>,
    last_scores: Vec<f64>,
    drift_tracker: Vec<DriftRecord>,
}

impl PcaCd {
    /// Detector with the standard Page-Hinkley monitor
    /// (`delta`, `round(0.01 · W)`, no burn-in).
    pub fn new(config: PcaCdConfig) -> Result<Self> {
        config.validate()?;
        let monitor = PageHinkley::new(config.delta, config.monitor_threshold(), 0);
        Self::with_monitor(config, monitor)
    }
}

impl<M: ScoreMonitor> PcaCd<M> {
    /// Detector with a caller-supplied monitor.
    pub fn with_monitor(config: PcaCdConfig, monitor: M) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            base: DetectorBase::new(),
            step: config.step() as u64,
            windows: WindowManager::new(&config),
            config,
            monitor,
            last_score: None,
            last_scores: Vec::new(),
            drift_tracker: Vec::new(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &PcaCdConfig {
        &self.config
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.windows.phase()
    }

    /// Observations between two evaluations.
    #[must_use]
    pub fn step(&self) -> u64 {
        self.step
    }

    #[must_use]
    pub fn monitor_threshold(&self) -> f64 {
        self.config.monitor_threshold()
    }

    /// Retained components of the current epoch. `None` until both windows
    /// are built.
    #[must_use]
    pub fn num_pcs(&self) -> Option<usize> {
        self.windows.num_components()
    }

    /// Reduced score of the most recent evaluation.
    #[must_use]
    pub fn last_score(&self) -> Option<f64> {
        self.last_score
    }

    /// Per-dimension scores of the most recent evaluation.
    #[must_use]
    pub fn last_scores(&self) -> &[f64] {
        &self.last_scores
    }

    #[must_use]
    pub fn reference_len(&self) -> usize {
        self.windows.reference_len()
    }

    #[must_use]
    pub fn test_len(&self) -> usize {
        self.windows.test_len()
    }

    #[must_use]
    pub fn windows(&self) -> &WindowManager {
        &self.windows
    }

    /// Monitor snapshots recorded at drift events (only with `track_state`).
    /// Survives [`DriftDetector::reset`].
    #[must_use]
    pub fn drift_tracker(&self) -> &[DriftRecord] {
        &self.drift_tracker
    }

    #[must_use]
    pub fn monitor(&self) -> &M {
        &self.monitor
    }

    fn evaluate(&mut self) -> Result<()> {
        let scores = self.windows.evaluate()?;
        let score = worst_dimension(&scores);
        self.last_scores = scores;
        self.last_score = Some(score);

        let sample = self.base.total_samples();
        debug!(sample, score, "divergence evaluated");

        if self.monitor.update(&score)?.is_drift() {
            self.base.set_state(DriftState::Drift);
            info!(
                sample,
                score,
                num_pcs = self.windows.num_components().unwrap_or(0),
                "pca-cd drift detected"
            );
            if self.config.track_state {
                self.drift_tracker.push(DriftRecord {
                    sample,
                    score,
                    monitor: self.monitor.snapshot(),
                });
            }
            self.windows.promote_test_to_reference()?;
        }
        Ok(())
    }
}

impl<M: ScoreMonitor> DriftDetector for PcaCd<M> {
    type Input = [f64];

    fn update(&mut self, observation: &[f64]) -> Result<DriftState> {
        self.windows.check_observation(observation)?;
        if self.base.state().is_drift() {
            // Windows keep the promoted reference.
            self.base.reset();
            self.monitor.reset();
        }

        let was_monitoring = self.windows.phase() == Phase::Monitoring;
        self.windows.push(observation)?;

        let total = self.base.total_samples();
        let due = was_monitoring && total != 0 && total % self.step == 0;
        let outcome = if due { self.evaluate() } else { Ok(()) };

        self.base.update();
        outcome?;
        Ok(self.base.state())
    }

    fn reset(&mut self) {
        self.base.reset();
        self.windows.clear();
        self.monitor.reset();
        self.last_score = None;
        self.last_scores.clear();
    }

    fn base(&self) -> &DetectorBase {
        &self.base
    }
}
