//! Univariate density estimation over one projected window column.
//!
//! Two strategies share one output shape, [`DensityEstimate`]:
//!
//! ```text
//! kernel:    f(x_i) = 1/(n·h) · Σ_j K((x_i - x_j) / h)
//!            K(u)   = 0.75 · (1 - u²)   for |u| ≤ 1, else 0   (Epanechnikov)
//!            h      = 1.06 · sd · n^(-1/5)                    (Silverman)
//! histogram: bins equal-width bins over [min, max], count / (n · width)
//! ```
//!
//! The kernel estimate is the self-density at the batch's own points, aligned
//! index-for-index with the input. The histogram estimate has one entry per
//! bin. Both are deterministic.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DriftError, Result};

/// Silverman's rule-of-thumb factor.
const SILVERMAN_FACTOR: f64 = 1.06;

/// Density estimation strategy for projected dimensions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DensityKind {
    /// Epanechnikov kernel density, evaluated at the window's own points.
    #[default]
    #[serde(alias = "kde")]
    Kernel,
    /// Equal-width histogram. Coarser and cheaper than the kernel estimate.
    #[serde(alias = "histograms")]
    Histogram,
}

impl DensityKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Kernel => "kde",
            Self::Histogram => "histogram",
        }
    }

    /// Parse, falling back to [`DensityKind::Kernel`] on unknown input.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }

    /// Estimate the density of `values`. `bins` is only read by the
    /// histogram strategy.
    pub fn estimate(self, values: &[f64], bins: usize) -> Result<DensityEstimate> {
        match self {
            Self::Kernel => kernel_density(values),
            Self::Histogram => histogram_density(values, bins),
        }
    }
}

impl FromStr for DensityKind {
    type Err = DriftError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kde" | "kernel" | "epanechnikov" => Ok(Self::Kernel),
            "histogram" | "histograms" | "hist" => Ok(Self::Histogram),
            _ => Err(DriftError::UnknownOption {
                option: "density",
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for DensityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discretized density of one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityEstimate {
    /// The batch the estimate was built from.
    pub points: Vec<f64>,
    /// Per-point (kernel) or per-bin (histogram) density values.
    pub density: Vec<f64>,
}

impl DensityEstimate {
    #[must_use]
    pub fn len(&self) -> usize {
        self.density.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.density.is_empty()
    }
}

/// Epanechnikov kernel.
#[must_use]
pub fn epanechnikov(u: f64) -> f64 {
    if u.abs() <= 1.0 {
        0.75 * (1.0 - u * u)
    } else {
        0.0
    }
}

/// Sample standard deviation (n - 1 denominator). Zero for fewer than two
/// values.
#[must_use]
pub fn sample_std(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let ss: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
    (ss / (n - 1) as f64).sqrt()
}

/// Silverman bandwidth `1.06 · sd · n^(-1/5)`, `n` being the size of the
/// batch the kernel is built on.
#[must_use]
pub fn silverman_bandwidth(sd: f64, n: usize) -> f64 {
    SILVERMAN_FACTOR * sd * (n as f64).powf(-0.2)
}

/// Kernel self-density of `values` at each of its own points.
///
/// Fails on an empty batch, on fewer than two values and on a zero-variance
/// batch, where the bandwidth collapses to zero.
pub fn kernel_density(values: &[f64]) -> Result<DensityEstimate> {
    let n = values.len();
    if n == 0 {
        return Err(DriftError::EmptyBatch);
    }
    if n < 2 {
        return Err(DriftError::DegenerateWindow {
            len: n,
            reason: "kernel density needs at least two values",
        });
    }
    // Identical values can leave a rounding-sized sd behind, so test them
    // directly.
    let sd = sample_std(values);
    let constant = values.iter().all(|&v| v == values[0]);
    if constant || sd.is_nan() || sd <= 0.0 {
        return Err(DriftError::DegenerateWindow {
            len: n,
            reason: "zero variance, kernel bandwidth is undefined",
        });
    }
    let h = silverman_bandwidth(sd, n);
    let norm = 1.0 / (n as f64 * h);

    let density = values
        .iter()
        .map(|&x| {
            let sum: f64 = values.iter().map(|&xj| epanechnikov((x - xj) / h)).sum();
            norm * sum
        })
        .collect();

    Ok(DensityEstimate {
        points: values.to_vec(),
        density,
    })
}

/// Histogram density with `bins` equal-width bins over `[min, max]`.
///
/// Values equal to `max` fall into the last bin. A constant batch gets a
/// unit-width range centred on its value.
pub fn histogram_density(values: &[f64], bins: usize) -> Result<DensityEstimate> {
    let n = values.len();
    if n == 0 {
        return Err(DriftError::EmptyBatch);
    }
    if bins == 0 {
        return Err(DriftError::InvalidConfig(
            "histogram needs at least one bin".to_string(),
        ));
    }

    let (mut lo, mut hi) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / bins as f64;

    let mut counts = vec![0_u64; bins];
    for &v in values {
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }

    let norm = 1.0 / (n as f64 * width);
    let density = counts.iter().map(|&c| c as f64 * norm).collect();

    Ok(DensityEstimate {
        points: values.to_vec(),
        density,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_density_kinds() {
        assert_eq!("kde".parse::<DensityKind>().unwrap(), DensityKind::Kernel);
        assert_eq!("KDE".parse::<DensityKind>().unwrap(), DensityKind::Kernel);
        assert_eq!("kernel".parse::<DensityKind>().unwrap(), DensityKind::Kernel);
        assert_eq!(
            "histograms".parse::<DensityKind>().unwrap(),
            DensityKind::Histogram
        );
        assert!("gaussian".parse::<DensityKind>().is_err());
        assert_eq!(DensityKind::from_str_loose("bogus"), DensityKind::Kernel);
    }

    #[test]
    fn kernel_shape() {
        assert_eq!(epanechnikov(0.0), 0.75);
        assert_eq!(epanechnikov(1.0), 0.0);
        assert_eq!(epanechnikov(-1.5), 0.0);
        assert!((epanechnikov(0.5) - 0.5625).abs() < 1e-15);
        assert_eq!(epanechnikov(0.3), epanechnikov(-0.3));
    }

    #[test]
    fn silverman_uses_fifth_root() {
        let h = silverman_bandwidth(2.0, 32);
        // 32^(-1/5) = 0.5
        assert!((h - 1.06).abs() < 1e-12, "h {h}");
    }

    #[test]
    fn sample_std_uses_bessel_correction() {
        assert!((sample_std(&[1.0, 2.0, 3.0, 4.0]) - 1.290_994_448_735_805_6).abs() < 1e-12);
        assert_eq!(sample_std(&[7.0]), 0.0);
    }

    #[test]
    fn kernel_density_two_points() {
        let est = kernel_density(&[0.0, 1.0]).unwrap();
        let h = silverman_bandwidth(std::f64::consts::FRAC_1_SQRT_2, 2);
        // Points are further apart than h, so only the self term survives.
        assert!(1.0 / h > 1.0);
        let expected = 0.75 / (2.0 * h);
        assert_eq!(est.len(), 2);
        for d in &est.density {
            assert!((d - expected).abs() < 1e-12, "density {d} vs {expected}");
        }
        assert_eq!(est.points, vec![0.0, 1.0]);
    }

    #[test]
    fn kernel_density_peaks_in_the_middle() {
        let values: Vec<f64> = (0..41).map(|i| ((i as f64) - 20.0) / 10.0).collect();
        let est = kernel_density(&values).unwrap();
        let centre = est.density[20];
        assert!(centre > est.density[0]);
        assert!(centre > est.density[40]);
        assert!((est.density[10] - est.density[30]).abs() < 1e-12);
    }

    #[test]
    fn kernel_density_is_deterministic() {
        let values = [0.3, -1.2, 2.5, 0.0, 0.7, -0.4, 1.9];
        let a = kernel_density(&values).unwrap();
        let b = kernel_density(&values).unwrap();
        assert_eq!(a, b);
        let c = DensityKind::Kernel.estimate(&values, 3).unwrap();
        assert_eq!(a, c);
    }

    #[test]
    fn kernel_density_rejects_degenerate_batches() {
        assert_eq!(kernel_density(&[]), Err(DriftError::EmptyBatch));
        assert!(matches!(
            kernel_density(&[1.0]),
            Err(DriftError::DegenerateWindow { len: 1, .. })
        ));
        assert!(matches!(
            kernel_density(&[2.0; 10]),
            Err(DriftError::DegenerateWindow { len: 10, .. })
        ));
        // The mean of [0.1; 3] rounds away from 0.1, leaving a tiny sd.
        assert!(sample_std(&[0.1; 3]) > 0.0);
        assert!(matches!(
            kernel_density(&[0.1; 3]),
            Err(DriftError::DegenerateWindow { len: 3, .. })
        ));
    }

    #[test]
    fn histogram_integrates_to_one() {
        let values: Vec<f64> = (0..100).map(|i| (i as f64).sqrt()).collect();
        let est = histogram_density(&values, 10).unwrap();
        assert_eq!(est.len(), 10);
        let width = (99_f64.sqrt() - 0.0) / 10.0;
        let area: f64 = est.density.iter().map(|d| d * width).sum();
        assert!((area - 1.0).abs() < 1e-12, "area {area}");
    }

    #[test]
    fn histogram_last_bin_is_closed() {
        let est = histogram_density(&[0.0, 1.0, 2.0, 3.0, 4.0], 4).unwrap();
        // Width 1: [0,1) [1,2) [2,3) [3,4]
        let counts: Vec<f64> = est.density.iter().map(|d| d * 5.0).collect();
        assert_eq!(counts, vec![1.0, 1.0, 1.0, 2.0]);
    }

    #[test]
    fn histogram_of_constant_batch_uses_unit_range() {
        let est = histogram_density(&[3.0; 8], 4).unwrap();
        // Range [2.5, 3.5], width 0.25, all mass in bin 2.
        assert_eq!(est.density, vec![0.0, 0.0, 4.0, 0.0]);
    }

    #[test]
    fn histogram_rejects_empty_input() {
        assert_eq!(histogram_density(&[], 4), Err(DriftError::EmptyBatch));
        assert!(histogram_density(&[1.0, 2.0], 0).is_err());
    }
}
