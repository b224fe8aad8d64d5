//! Reference/test window manager.
//!
//! Lifecycle, one observation per [`WindowManager::push`]:
//!
//! ```text
//! BuildingReference ──(reference full)──▶ BuildingTest ──(test full, epoch fit)──▶ Monitoring
//!        ▲                                                                           │
//!        └──────────────── promote_test_to_reference() (on drift) ◀──────────────────┘
//! ```
//!
//! An [`Epoch`] holds everything fit on one reference window: the optional
//! scaler, the projection, the frozen reference densities and the sliding
//! test projection. It exists only in `Monitoring` and is dropped whenever the
//! reference is replaced.
//!
//! Reference and test densities are paired entry by entry, in window order.
//! Three opt-in normalizations change what is scored:
//!
//! * `standardize_components`: each projected column is divided by the
//!   standard deviation of its reference column, removing the input units.
//! * `rank_align`: columns are sorted before estimation, so entries pair by
//!   rank.
//! * `per_entry_scores`: KL and intersection sums become means.
//!
//! Every fallible step of `push` runs before any buffer is touched; a failed
//! push leaves the manager unchanged.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PcaCdConfig;
use crate::distribution::check_row;
use crate::distribution::density::{DensityEstimate, DensityKind, sample_std};
use crate::distribution::divergence::DivergenceMetric;
use crate::distribution::projection::Pca;
use crate::distribution::scaler::StandardScaler;
use crate::error::{DriftError, Result, ensure_finite};

/// Lifecycle phase of the window manager.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Filling the reference window.
    #[default]
    BuildingReference,
    /// Reference full, filling the test window.
    BuildingTest,
    /// Both windows full, test window sliding.
    Monitoring,
}

impl Phase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BuildingReference => "building_reference",
            Self::BuildingTest => "building_test",
            Self::Monitoring => "monitoring",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Models and projections fit on one reference window.
#[derive(Debug, Clone)]
struct Epoch {
    scaler: Option<StandardScaler>,
    pca: Pca,
    /// Reference standard deviation of each projected column, when
    /// components are standardized.
    column_scale: Option<Vec<f64>>,
    reference_density: Vec<DensityEstimate>,
    /// One sliding column per retained component.
    test_projection: Vec<VecDeque<f64>>,
}

impl Epoch {
    /// Scale and project one raw observation. Returns `(scaled, projected)`.
    fn project(&self, observation: &[f64]) -> Result<(Vec<f64>, Vec<f64>)> {
        let scaled = match &self.scaler {
            Some(scaler) => scaler.transform_row(observation)?,
            None => observation.to_vec(),
        };
        let mut projected = self.pca.transform_row(&scaled)?;
        if let Some(scale) = &self.column_scale {
            projected.iter_mut().zip(scale).for_each(|(v, s)| *v /= s);
        }
        Ok((scaled, projected))
    }
}

/// Owner of the reference and test windows and of the current epoch.
#[derive(Debug, Clone)]
pub struct WindowManager {
    window_size: usize,
    ev_threshold: f64,
    online_scaling: bool,
    standardize_components: bool,
    rank_align: bool,
    per_entry_scores: bool,
    density: DensityKind,
    metric: DivergenceMetric,
    bins: usize,
    /// Fixed by the first observation after construction or `clear()`.
    n_features: Option<usize>,
    /// Raw rows while building; scaled rows once an epoch with a scaler is
    /// fit.
    reference: VecDeque<Vec<f64>>,
    test: VecDeque<Vec<f64>>,
    phase: Phase,
    epoch: Option<Epoch>,
}

impl WindowManager {
    #[must_use]
    pub fn new(config: &PcaCdConfig) -> Self {
        Self {
            window_size: config.window_size,
            ev_threshold: config.ev_threshold,
            online_scaling: config.online_scaling,
            standardize_components: config.standardize_components,
            rank_align: config.rank_align,
            per_entry_scores: config.per_entry_scores,
            density: config.density,
            metric: config.divergence_metric,
            bins: config.bins(),
            n_features: None,
            reference: VecDeque::with_capacity(config.window_size),
            test: VecDeque::with_capacity(config.window_size),
            phase: Phase::BuildingReference,
            epoch: None,
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    #[must_use]
    pub fn reference_len(&self) -> usize {
        self.reference.len()
    }

    #[must_use]
    pub fn test_len(&self) -> usize {
        self.test.len()
    }

    /// Feature count established for the current stream, if any.
    #[must_use]
    pub fn n_features(&self) -> Option<usize> {
        self.n_features
    }

    /// Retained projection dimensions of the current epoch.
    #[must_use]
    pub fn num_components(&self) -> Option<usize> {
        self.epoch.as_ref().map(|e| e.pca.num_components())
    }

    /// Explained-variance ratios of the current epoch's projection.
    #[must_use]
    pub fn explained_variance_ratio(&self) -> Option<&[f64]> {
        self.epoch.as_ref().map(|e| e.pca.explained_variance_ratio())
    }

    /// Frozen reference densities of the current epoch.
    #[must_use]
    pub fn reference_densities(&self) -> Option<&[DensityEstimate]> {
        self.epoch.as_ref().map(|e| e.reference_density.as_slice())
    }

    /// Validate `observation` against the established shape without
    /// consuming it.
    pub fn check_observation(&self, observation: &[f64]) -> Result<()> {
        if observation.is_empty() {
            return Err(DriftError::EmptyObservation);
        }
        ensure_finite(observation)?;
        if let Some(expected) = self.n_features {
            check_row(observation, expected)?;
        }
        Ok(())
    }

    /// Advance the lifecycle by one observation. Returns the phase after the
    /// observation was consumed.
    pub fn push(&mut self, observation: &[f64]) -> Result<Phase> {
        self.check_observation(observation)?;

        if self.phase == Phase::BuildingReference {
            if self.reference.len() < self.window_size {
                self.reference.push_back(observation.to_vec());
                self.n_features = Some(observation.len());
                if self.reference.len() == self.window_size {
                    self.phase = Phase::BuildingTest;
                }
                return Ok(self.phase);
            }
            // Promoted reference is already full.
            self.phase = Phase::BuildingTest;
        }

        match self.phase {
            Phase::BuildingTest => {
                self.test.push_back(observation.to_vec());
                if self.test.len() == self.window_size
                    && let Err(err) = self.fit_epoch()
                {
                    self.test.pop_back();
                    return Err(err);
                }
            }
            Phase::Monitoring => self.slide(observation)?,
            Phase::BuildingReference => {}
        }
        Ok(self.phase)
    }

    /// Fit scaler and projection on the full reference window, project both
    /// windows and freeze the reference densities.
    fn fit_epoch(&mut self) -> Result<()> {
        let scaler = if self.online_scaling {
            Some(StandardScaler::fit(&self.reference)?)
        } else {
            None
        };
        let (reference, test) = match &scaler {
            Some(s) => (s.transform(&self.reference)?, s.transform(&self.test)?),
            None => (
                self.reference.iter().cloned().collect(),
                self.test.iter().cloned().collect(),
            ),
        };

        let pca = Pca::fit(&reference, self.ev_threshold)?;
        let k = pca.num_components();
        let mut reference_columns = columns(&pca.transform(&reference)?, k);
        let mut test_columns = columns(&pca.transform(&test)?, k);

        let column_scale = self.standardize_components.then(|| {
            reference_columns
                .iter()
                .map(|col| {
                    let sd = sample_std(col);
                    if sd > 0.0 { sd } else { 1.0 }
                })
                .collect::<Vec<f64>>()
        });
        if let Some(scale) = &column_scale {
            for ((r, t), s) in reference_columns
                .iter_mut()
                .zip(test_columns.iter_mut())
                .zip(scale)
            {
                r.iter_mut().for_each(|v| *v /= s);
                t.iter_mut().for_each(|v| *v /= s);
            }
        }

        let reference_density = reference_columns
            .into_iter()
            .map(|col| self.estimate_density(col))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            window_size = self.window_size,
            num_components = k,
            scaled = scaler.is_some(),
            "epoch fitted"
        );

        self.reference = reference.into();
        self.test = test.into();
        self.epoch = Some(Epoch {
            scaler,
            pca,
            column_scale,
            reference_density,
            test_projection: test_columns.into_iter().map(VecDeque::from).collect(),
        });
        self.phase = Phase::Monitoring;
        Ok(())
    }

    fn slide(&mut self, observation: &[f64]) -> Result<()> {
        let Some(epoch) = self.epoch.as_mut() else {
            return Err(DriftError::WindowNotReady(self.phase.as_str()));
        };
        let (scaled, projected) = epoch.project(observation)?;

        self.test.pop_front();
        self.test.push_back(scaled);
        for (column, value) in epoch.test_projection.iter_mut().zip(projected) {
            column.pop_front();
            column.push_back(value);
        }
        Ok(())
    }

    /// Per-dimension divergence between the frozen reference densities and
    /// freshly estimated test densities.
    pub fn evaluate(&self) -> Result<Vec<f64>> {
        let Some(epoch) = self.epoch.as_ref() else {
            return Err(DriftError::WindowNotReady(self.phase.as_str()));
        };
        epoch
            .test_projection
            .iter()
            .zip(&epoch.reference_density)
            .map(|(column, reference)| {
                let test = self.estimate_density(column.iter().copied().collect())?;
                if self.per_entry_scores {
                    self.metric.mean_score(reference, &test)
                } else {
                    self.metric.score(reference, &test)
                }
            })
            .collect()
    }

    fn estimate_density(&self, mut column: Vec<f64>) -> Result<DensityEstimate> {
        if self.rank_align {
            column.sort_by(f64::total_cmp);
        }
        self.density.estimate(&column, self.bins)
    }

    /// Replace the reference with the current test window (back in raw
    /// feature space), drop the epoch and start building a new test window.
    pub fn promote_test_to_reference(&mut self) -> Result<()> {
        let scaler = self.epoch.as_ref().and_then(|e| e.scaler.as_ref());
        let promoted: VecDeque<Vec<f64>> = match scaler {
            Some(scaler) => scaler.inverse_transform(&self.test)?.into(),
            None => std::mem::take(&mut self.test),
        };
        self.reference = promoted;
        self.test.clear();
        self.epoch = None;
        self.phase = Phase::BuildingReference;
        Ok(())
    }

    /// Drop both windows, the epoch and the established feature count.
    pub fn clear(&mut self) {
        self.reference.clear();
        self.test.clear();
        self.epoch = None;
        self.n_features = None;
        self.phase = Phase::BuildingReference;
    }
}

/// Transpose projected rows into `k` columns.
fn columns(rows: &[Vec<f64>], k: usize) -> Vec<Vec<f64>> {
    (0..k)
        .map(|j| rows.iter().map(|row| row[j]).collect())
        .collect()
}
