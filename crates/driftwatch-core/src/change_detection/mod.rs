//! Scalar change detectors.
//!
//! These monitor a univariate stream (a model metric, a single feature, or a
//! divergence score produced by another detector) for a bi-directional shift
//! in its level. Both implement [`ScoreMonitor`], which is what PCA-CD needs
//! from its internal thresholding stage.

pub mod cusum;
pub mod page_hinkley;

use serde::{Deserialize, Serialize};

use crate::detector::{DriftDetector, DriftState};

pub use cusum::Cusum;
pub use page_hinkley::PageHinkley;

/// Which shift of the level a monitor watches for.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Upward shifts only.
    #[default]
    Positive,
    /// Downward shifts only.
    Negative,
    /// Either way.
    Both,
}

impl Direction {
    #[must_use]
    pub const fn watches_increase(self) -> bool {
        matches!(self, Self::Positive | Self::Both)
    }

    #[must_use]
    pub const fn watches_decrease(self) -> bool {
        matches!(self, Self::Negative | Self::Both)
    }
}

/// Point-in-time view of a scalar monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    pub kind: String,
    pub state: DriftState,
    pub total_samples: u64,
    pub samples_since_reset: u64,
    /// Current test statistic (the larger side for two-sided monitors).
    pub statistic: f64,
    pub threshold: f64,
    /// Running mean (Page-Hinkley) or burn-in target mean (CUSUM).
    pub mean: f64,
}

/// A scalar detector usable as the thresholding stage of a compound detector.
pub trait ScoreMonitor: DriftDetector<Input = f64> {
    fn snapshot(&self) -> MonitorSnapshot;
}
