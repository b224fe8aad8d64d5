//! Principal component projection fit on one reference window.
//!
//! The sample covariance of the centred batch is diagonalized with cyclic
//! Jacobi rotations, which are exact enough for the small, dense, symmetric
//! matrices a feature covariance produces and need no external linear algebra:
//!
//! ```text
//! θ = (a_qq - a_pp) / (2·a_pq)
//! t = sgn(θ) / (|θ| + √(θ² + 1)),  c = 1/√(t² + 1),  s = t·c
//! A ← Jᵀ·A·J,  V ← V·J        (J rotates the (p, q) plane, zeroing a_pq)
//! ```
//!
//! Components are ordered by descending eigenvalue. `k` is the smallest count
//! whose cumulative explained-variance ratio reaches `ev_threshold`, never
//! less than one. Each component is oriented so its largest-magnitude
//! loading is positive, which makes the projection deterministic.

use tracing::debug;

use crate::distribution::check_row;
use crate::error::{DriftError, Result};

/// Upper bound on Jacobi sweeps. Convergence is quadratic, so real inputs
/// finish in well under ten.
const MAX_SWEEPS: usize = 100;

/// Relative off-diagonal mass below which the matrix counts as diagonal.
const JACOBI_TOLERANCE: f64 = 1e-24;

/// Fitted principal component model.
#[derive(Debug, Clone, PartialEq)]
pub struct Pca {
    mean: Vec<f64>,
    /// All components, row-major, sorted by descending variance.
    components: Vec<Vec<f64>>,
    explained_variance: Vec<f64>,
    explained_variance_ratio: Vec<f64>,
    num_components: usize,
}

impl Pca {
    /// Fit on a batch of equal-length rows and keep the components needed to
    /// reach `ev_threshold` of the total variance.
    pub fn fit<I>(rows: I, ev_threshold: f64) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: AsRef<[f64]>,
    {
        let data = collect_rows(rows)?;
        let n = data.len();
        let d = data[0].len();

        let mut mean = vec![0.0; d];
        for row in &data {
            for (m, x) in mean.iter_mut().zip(row) {
                *m += x;
            }
        }
        for m in &mut mean {
            *m /= n as f64;
        }

        let denom = n.saturating_sub(1).max(1) as f64;
        let mut cov = vec![vec![0.0; d]; d];
        for row in &data {
            for i in 0..d {
                let ci = row[i] - mean[i];
                for j in i..d {
                    cov[i][j] += ci * (row[j] - mean[j]);
                }
            }
        }
        for i in 0..d {
            for j in i..d {
                cov[i][j] /= denom;
                cov[j][i] = cov[i][j];
            }
        }

        let (eigenvalues, eigenvectors) = symmetric_eigen(cov);

        let mut order: Vec<usize> = (0..d).collect();
        order.sort_by(|&a, &b| eigenvalues[b].total_cmp(&eigenvalues[a]));

        let explained_variance: Vec<f64> =
            order.iter().map(|&k| eigenvalues[k].max(0.0)).collect();
        let components: Vec<Vec<f64>> = order
            .iter()
            .map(|&k| {
                let mut v: Vec<f64> = (0..d).map(|i| eigenvectors[i][k]).collect();
                orient(&mut v);
                v
            })
            .collect();

        let total: f64 = explained_variance.iter().sum();
        let explained_variance_ratio: Vec<f64> = if total > 0.0 {
            explained_variance.iter().map(|v| v / total).collect()
        } else {
            vec![0.0; d]
        };
        let num_components = select_components(&explained_variance_ratio, total, ev_threshold);

        debug!(
            rows = n,
            features = d,
            num_components,
            leading_ratio = explained_variance_ratio[0],
            "pca fitted"
        );

        Ok(Self {
            mean,
            components,
            explained_variance,
            explained_variance_ratio,
            num_components,
        })
    }

    /// Number of retained components `k`.
    #[must_use]
    pub fn num_components(&self) -> usize {
        self.num_components
    }

    #[must_use]
    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    /// Variance ratio of every component, retained or not.
    #[must_use]
    pub fn explained_variance_ratio(&self) -> &[f64] {
        &self.explained_variance_ratio
    }

    #[must_use]
    pub fn explained_variance(&self) -> &[f64] {
        &self.explained_variance
    }

    /// The retained components, each of length `n_features`.
    #[must_use]
    pub fn components(&self) -> &[Vec<f64>] {
        &self.components[..self.num_components]
    }

    #[must_use]
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Project one row into the `k` retained dimensions.
    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        check_row(row, self.n_features())?;
        Ok(self
            .components()
            .iter()
            .map(|c| {
                c.iter()
                    .zip(row.iter().zip(&self.mean))
                    .map(|(w, (x, m))| w * (x - m))
                    .sum()
            })
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
}

fn collect_rows<I>(rows: I) -> Result<Vec<Vec<f64>>>
where
    I: IntoIterator,
    I::Item: AsRef<[f64]>,
{
    let mut data: Vec<Vec<f64>> = Vec::new();
    for (i, row) in rows.into_iter().enumerate() {
        let row = row.as_ref();
        if let Some(first) = data.first()
            && first.len() != row.len()
        {
            return Err(DriftError::RaggedBatch {
                row: i,
                expected: first.len(),
                got: row.len(),
            });
        }
        if row.is_empty() {
            return Err(DriftError::EmptyObservation);
        }
        data.push(row.to_vec());
    }
    if data.is_empty() {
        return Err(DriftError::EmptyBatch);
    }
    Ok(data)
}

fn select_components(ratios: &[f64], total: f64, ev_threshold: f64) -> usize {
    if total <= 0.0 {
        return 1;
    }
    let mut cumulative = 0.0;
    for (i, r) in ratios.iter().enumerate() {
        cumulative += r;
        if cumulative >= ev_threshold {
            return i + 1;
        }
    }
    ratios.len()
}

/// Flip `v` so that its largest-magnitude entry is positive.
fn orient(v: &mut [f64]) {
    let mut pivot = 0.0_f64;
    for &x in v.iter() {
        if x.abs() > pivot.abs() {
            pivot = x;
        }
    }
    if pivot < 0.0 {
        for x in v.iter_mut() {
            *x = -*x;
        }
    }
}

/// Eigenvalues and eigenvectors (as columns of the returned matrix) of a
/// symmetric matrix.
fn symmetric_eigen(mut a: Vec<Vec<f64>>) -> (Vec<f64>, Vec<Vec<f64>>) {
    let n = a.len();
    let mut v: Vec<Vec<f64>> = (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();

    for _ in 0..MAX_SWEEPS {
        let mut off = 0.0;
        let mut diag = 0.0;
        for i in 0..n {
            diag += a[i][i] * a[i][i];
            for j in (i + 1)..n {
                off += a[i][j] * a[i][j];
            }
        }
        if off == 0.0 || off <= JACOBI_TOLERANCE * (diag + off) {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[p][q];
                if apq == 0.0 {
                    continue;
                }
                let theta = (a[q][q] - a[p][p]) / (2.0 * apq);
                let sign = if theta >= 0.0 { 1.0 } else { -1.0 };
                let t = sign / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for row in a.iter_mut() {
                    let (akp, akq) = (row[p], row[q]);
                    row[p] = c * akp - s * akq;
                    row[q] = s * akp + c * akq;
                }
                for k in 0..n {
                    let (apk, aqk) = (a[p][k], a[q][k]);
                    a[p][k] = c * apk - s * aqk;
                    a[q][k] = s * apk + c * aqk;
                }
                for row in v.iter_mut() {
                    let (vkp, vkq) = (row[p], row[q]);
                    row[p] = c * vkp - s * vkq;
                    row[q] = s * vkp + c * vkq;
                }
            }
        }
    }

    let eigenvalues = (0..n).map(|i| a[i][i]).collect();
    (eigenvalues, v)
}
