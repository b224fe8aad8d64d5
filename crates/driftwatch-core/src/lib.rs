//! Online drift detectors.
//!
//! This crate provides:
//! - A shared detector contract: three-valued state, sample counters, reset
//! - Scalar change detectors: Page-Hinkley and CUSUM
//! - EDDM, for a classifier's error stream
//! - PCA-CD, for multivariate streams: sliding reference/test windows,
//!   principal-component projection, per-dimension density estimation and
//!   divergence scoring, thresholded by an internal scalar monitor
//!
//! Every detector consumes one observation per `update` call and keeps
//! bounded state. The crate emits `tracing` events but never installs a
//! subscriber.

#![forbid(unsafe_code)]

pub mod change_detection;
pub mod concept_drift;
pub mod config;
pub mod detector;
pub mod distribution;
pub mod error;

pub use change_detection::{Cusum, Direction, MonitorSnapshot, PageHinkley, ScoreMonitor};
pub use concept_drift::Eddm;
pub use config::PcaCdConfig;
pub use detector::{DetectorBase, DriftDetector, DriftState};
pub use distribution::pca_cd::{DriftRecord, worst_dimension};
pub use distribution::{DensityKind, DivergenceMetric, PcaCd, Phase};
pub use error::{DriftError, Result};
