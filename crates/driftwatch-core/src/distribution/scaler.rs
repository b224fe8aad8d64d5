//! Per-feature standardization fit on one reference window.
//!
//! `z = (x - mean) / scale` with the population standard deviation as scale.
//! A zero-variance feature keeps `scale = 1`, so it is centred but not
//! blown up.

use crate::distribution::check_row;
use crate::error::{DriftError, Result};

/// Streaming mean/variance for one feature.
#[derive(Debug, Clone, Copy, Default)]
struct Welford {
    count: u64,
    mean: f64,
    m2: f64,
}

impl Welford {
    fn update(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    fn population_std(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.m2 / self.count as f64).sqrt()
        }
    }
}

/// Fitted standard scaler.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    /// Fit on a batch of equal-length rows.
    pub fn fit<I>(rows: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: AsRef<[f64]>,
    {
        let mut stats: Vec<Welford> = Vec::new();
        let mut n_rows = 0usize;
        for (i, row) in rows.into_iter().enumerate() {
            let row = row.as_ref();
            if i == 0 {
                if row.is_empty() {
                    return Err(DriftError::EmptyObservation);
                }
                stats = vec![Welford::default(); row.len()];
            } else if row.len() != stats.len() {
                return Err(DriftError::RaggedBatch {
                    row: i,
                    expected: stats.len(),
                    got: row.len(),
                });
            }
            for (acc, &x) in stats.iter_mut().zip(row) {
                acc.update(x);
            }
            n_rows += 1;
        }
        if n_rows == 0 {
            return Err(DriftError::EmptyBatch);
        }

        let mean = stats.iter().map(|s| s.mean).collect();
        let scale = stats
            .iter()
            .map(|s| {
                let sd = s.population_std();
                if sd > 0.0 { sd } else { 1.0 }
            })
            .collect();
        Ok(Self { mean, scale })
    }

    #[must_use]
    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    #[must_use]
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    #[must_use]
    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        check_row(row, self.n_features())?;
        Ok(row
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (m, s))| (x - m) / s)
            .collect())
    }

    pub fn inverse_transform_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        check_row(row, self.n_features())?;
        Ok(row
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(z, (m, s))| z * s + m)
            .collect())
    }

    pub fn transform<I>(&self, rows: I) -> Result<Vec<Vec<f64>>>
    where
        I: IntoIterator,
        I::Item: AsRef<[f64]>,
    {
        rows.into_iter()
            .map(|row| self.transform_row(row.as_ref()))
            .collect()
    }

    pub fn inverse_transform<I>(&self, rows: I) -> Result<Vec<Vec<f64>>>
    where
        I: IntoIterator,
        I::Item: AsRef<[f64]>,
    {
        rows.into_iter()
            .map(|row| self.inverse_transform_row(row.as_ref()))
            .collect()
    }
}
