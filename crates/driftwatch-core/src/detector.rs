//! Base contract shared by every drift detector.
//!
//! A detector is a small state machine over `{Stable, Warning, Drift}` plus two
//! sample counters. Concrete detectors embed a [`DetectorBase`] and implement
//! [`DriftDetector`]; the base only knows how to count and how to reset.
//!
//! `Drift` is a one-shot signal: a concrete `update` that starts while the
//! state is `Drift` resets before it processes the new input.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Qualitative state of a detector.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftState {
    /// No alarm.
    #[default]
    Stable,
    /// Early alarm level, only produced by two-level detectors.
    Warning,
    /// Change detected. Cleared by the next update.
    Drift,
}

impl DriftState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stable => "stable",
            Self::Warning => "warning",
            Self::Drift => "drift",
        }
    }

    #[must_use]
    pub const fn is_drift(self) -> bool {
        matches!(self, Self::Drift)
    }

    /// True for `Warning` and `Drift`.
    #[must_use]
    pub const fn is_alarm(self) -> bool {
        !matches!(self, Self::Stable)
    }
}

impl std::fmt::Display for DriftState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters and state owned by every detector.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DetectorBase {
    /// Samples ever accepted. Never reset.
    total_samples: u64,
    /// Samples accepted since the last reset.
    samples_since_reset: u64,
    state: DriftState,
}

impl DetectorBase {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            total_samples: 0,
            samples_since_reset: 0,
            state: DriftState::Stable,
        }
    }

    /// Count one accepted sample. Called exactly once per concrete update.
    pub fn update(&mut self) {
        self.total_samples += 1;
        self.samples_since_reset += 1;
    }

    /// Zero `samples_since_reset` and return to `Stable`.
    pub fn reset(&mut self) {
        self.samples_since_reset = 0;
        self.state = DriftState::Stable;
    }

    #[must_use]
    pub const fn state(&self) -> DriftState {
        self.state
    }

    pub fn set_state(&mut self, state: DriftState) {
        self.state = state;
    }

    #[must_use]
    pub const fn total_samples(&self) -> u64 {
        self.total_samples
    }

    #[must_use]
    pub const fn samples_since_reset(&self) -> u64 {
        self.samples_since_reset
    }
}

/// A detector fed one input at a time.
pub trait DriftDetector {
    /// One observation: a scalar, a feature vector, a prediction pair.
    type Input: ?Sized;

    /// Consume one input and return the resulting state.
    fn update(&mut self, input: &Self::Input) -> Result<DriftState>;

    /// Clear accumulated statistics and the base counters/state.
    fn reset(&mut self);

    fn base(&self) -> &DetectorBase;

    fn state(&self) -> DriftState {
        self.base().state()
    }

    fn total_samples(&self) -> u64 {
        self.base().total_samples()
    }

    fn samples_since_reset(&self) -> u64 {
        self.base().samples_since_reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_counts_both_counters() {
        let mut base = DetectorBase::new();
        for _ in 0..5 {
            base.update();
        }
        assert_eq!(base.total_samples(), 5);
        assert_eq!(base.samples_since_reset(), 5);
    }

    #[test]
    fn reset_keeps_total_samples() {
        let mut base = DetectorBase::new();
        base.update();
        base.update();
        base.set_state(DriftState::Drift);
        base.reset();
        assert_eq!(base.total_samples(), 2);
        assert_eq!(base.samples_since_reset(), 0);
        assert_eq!(base.state(), DriftState::Stable);

        base.update();
        assert_eq!(base.total_samples(), 3);
        assert_eq!(base.samples_since_reset(), 1);
    }

    #[test]
    fn default_matches_new() {
        assert_eq!(DetectorBase::default(), DetectorBase::new());
        assert_eq!(DriftState::default(), DriftState::Stable);
    }

    #[test]
    fn state_predicates() {
        assert!(!DriftState::Stable.is_alarm());
        assert!(DriftState::Warning.is_alarm());
        assert!(DriftState::Drift.is_alarm());
        assert!(DriftState::Drift.is_drift());
        assert!(!DriftState::Warning.is_drift());
        assert_eq!(DriftState::Warning.to_string(), "warning");
    }
}
