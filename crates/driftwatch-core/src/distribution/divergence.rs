//! Divergence between a reference and a test density.
//!
//! ```text
//! KL(P‖Q)        = Σ p_i · ln(p_i / q_i)         entries with p_i or q_i < ε skipped
//! KL_sym(P, Q)   = max(KL(P‖Q), KL(Q‖P))
//! intersection   = ½ · Σ |p_i - q_i|
//! llh(P, Q)      = | mean_y∈Q ln f_P(y) - mean_x∈P ln f_P(x) |
//! ```
//!
//! `f_P` is an Epanechnikov kernel built on the reference points with the
//! Silverman bandwidth of the test points. Kernel sums are floored at ε so a
//! test point outside the reference support costs `ln ε` instead of `-∞`.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::distribution::density::{DensityEstimate, epanechnikov, sample_std, silverman_bandwidth};
use crate::error::{DriftError, Result};

/// Density floor for the logarithms.
pub const EPSILON: f64 = 1e-12;

/// Dissimilarity between reference and test densities.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DivergenceMetric {
    /// Symmetric discrete Kullback-Leibler.
    #[default]
    Kl,
    /// Absolute difference of per-sample kernel log-likelihoods.
    #[serde(alias = "llh", alias = "log-likelihood")]
    LogLikelihood,
    /// Half the L1 distance between aligned densities.
    Intersection,
}

impl DivergenceMetric {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Kl => "kl",
            Self::LogLikelihood => "llh",
            Self::Intersection => "intersection",
        }
    }

    /// Parse, falling back to [`DivergenceMetric::Kl`] on unknown input.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }

    /// Divergence between two estimates of one dimension: the plain sums above
    /// for KL and intersection, the per-sample gap for log-likelihood.
    pub fn score(self, reference: &DensityEstimate, test: &DensityEstimate) -> Result<f64> {
        match self {
            Self::Kl => kl_symmetric(&reference.density, &test.density),
            Self::Intersection => intersection_area(&reference.density, &test.density),
            Self::LogLikelihood => log_likelihood(&reference.points, &test.points),
        }
    }

    /// [`score`](Self::score) with the KL and intersection sums divided by the
    /// number of aligned entries. Log-likelihood is already a per-sample mean
    /// and is returned unchanged.
    pub fn mean_score(self, reference: &DensityEstimate, test: &DensityEstimate) -> Result<f64> {
        let total = self.score(reference, test)?;
        match self {
            Self::LogLikelihood => Ok(total),
            Self::Kl | Self::Intersection => per_entry(total, reference.len()),
        }
    }
}

impl FromStr for DivergenceMetric {
    type Err = DriftError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kl" | "kullback-leibler" => Ok(Self::Kl),
            "llh" | "log-likelihood" | "loglikelihood" => Ok(Self::LogLikelihood),
            "intersection" | "intersection-area" => Ok(Self::Intersection),
            _ => Err(DriftError::UnknownOption {
                option: "divergence_metric",
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for DivergenceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn per_entry(total: f64, len: usize) -> Result<f64> {
    if len == 0 {
        return Err(DriftError::EmptyBatch);
    }
    Ok(total / len as f64)
}

fn check_aligned(p: &[f64], q: &[f64]) -> Result<()> {
    if p.len() != q.len() {
        return Err(DriftError::LengthMismatch(p.len(), q.len()));
    }
    Ok(())
}

/// Discrete `KL(P‖Q)` over aligned entries. Entries where either side is
/// below [`EPSILON`] contribute zero.
pub fn kl_discrete(p: &[f64], q: &[f64]) -> Result<f64> {
    check_aligned(p, q)?;
    Ok(p.iter()
        .zip(q)
        .filter(|&(&pi, &qi)| pi >= EPSILON && qi >= EPSILON)
        .map(|(&pi, &qi)| pi * (pi / qi).ln())
        .sum())
}

/// `max(KL(P‖Q), KL(Q‖P))`. Symmetric by construction.
pub fn kl_symmetric(p: &[f64], q: &[f64]) -> Result<f64> {
    Ok(kl_discrete(p, q)?.max(kl_discrete(q, p)?))
}

/// `½ · Σ |p_i - q_i|`.
pub fn intersection_area(p: &[f64], q: &[f64]) -> Result<f64> {
    check_aligned(p, q)?;
    Ok(0.5 * p.iter().zip(q).map(|(a, b)| (a - b).abs()).sum::<f64>())
}

/// Log-likelihood divergence of `q_points` against a kernel built on
/// `p_points`.
pub fn log_likelihood(p_points: &[f64], q_points: &[f64]) -> Result<f64> {
    if p_points.is_empty() || q_points.is_empty() {
        return Err(DriftError::EmptyBatch);
    }
    let n = p_points.len();
    let h = silverman_bandwidth(sample_std(q_points), n);
    if h.is_nan() || h <= 0.0 {
        return Err(DriftError::DegenerateWindow {
            len: q_points.len(),
            reason: "zero variance, kernel bandwidth is undefined",
        });
    }

    let inv_n = 1.0 / n as f64;
    let mean_log_density = |points: &[f64]| -> f64 {
        let total: f64 = points
            .iter()
            .map(|&y| {
                let k: f64 = p_points.iter().map(|&x| epanechnikov((y - x) / h)).sum();
                (k * inv_n).max(EPSILON).ln()
            })
            .sum();
        total / points.len() as f64
    };

    Ok((mean_log_density(q_points) - mean_log_density(p_points)).abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_divergence_metrics() {
        assert_eq!(
            "kl".parse::<DivergenceMetric>().unwrap(),
            DivergenceMetric::Kl
        );
        assert_eq!(
            "llh".parse::<DivergenceMetric>().unwrap(),
            DivergenceMetric::LogLikelihood
        );
        assert_eq!(
            "Intersection".parse::<DivergenceMetric>().unwrap(),
            DivergenceMetric::Intersection
        );
        let err = "hellinger".parse::<DivergenceMetric>().unwrap_err();
        assert!(err.to_string().contains("hellinger"));
        assert_eq!(
            DivergenceMetric::from_str_loose("hellinger"),
            DivergenceMetric::Kl
        );
    }

    #[test]
    fn kl_of_identical_vectors_is_zero() {
        let p = [0.1, 0.4, 0.3, 0.2];
        assert_eq!(kl_discrete(&p, &p).unwrap(), 0.0);
        assert_eq!(kl_symmetric(&p, &p).unwrap(), 0.0);
    }

    #[test]
    fn kl_symmetric_is_symmetric() {
        let p = [0.1, 0.4, 0.3, 0.2];
        let q = [0.25, 0.25, 0.25, 0.25];
        let pq = kl_symmetric(&p, &q).unwrap();
        let qp = kl_symmetric(&q, &p).unwrap();
        assert_eq!(pq, qp);
        assert!(pq > 0.0);
        assert!(pq >= kl_discrete(&p, &q).unwrap());
        assert!(pq >= kl_discrete(&q, &p).unwrap());
    }

    #[test]
    fn kl_skips_zero_bins() {
        let p = [0.0, 0.5, 0.5, 0.0];
        let q = [0.5, 0.0, 0.25, 0.25];
        let d = kl_symmetric(&p, &q).unwrap();
        assert!(d.is_finite(), "kl {d}");
        // Only the third bin is shared.
        let expected = (0.5 * (0.5_f64 / 0.25).ln()).max(0.25 * (0.25_f64 / 0.5).ln());
        assert!((d - expected).abs() < 1e-15);
    }

    #[test]
    fn intersection_is_half_l1_and_symmetric() {
        let p = [0.2, 0.3, 0.5];
        let q = [0.4, 0.4, 0.2];
        let d = intersection_area(&p, &q).unwrap();
        assert!((d - 0.3).abs() < 1e-12);
        assert_eq!(d, intersection_area(&q, &p).unwrap());
        assert_eq!(intersection_area(&p, &p).unwrap(), 0.0);
    }

    #[test]
    fn length_mismatch_is_an_error() {
        assert_eq!(
            kl_discrete(&[0.5, 0.5], &[1.0]),
            Err(DriftError::LengthMismatch(2, 1))
        );
        assert!(intersection_area(&[0.5], &[0.5, 0.5]).is_err());
    }

    #[test]
    fn log_likelihood_grows_with_shift() {
        let p: Vec<f64> = (0..50).map(|i| (i as f64) / 10.0).collect();
        let same = log_likelihood(&p, &p).unwrap();
        assert_eq!(same, 0.0);

        let near: Vec<f64> = p.iter().map(|x| x + 0.5).collect();
        let far: Vec<f64> = p.iter().map(|x| x + 3.0).collect();
        let d_near = log_likelihood(&p, &near).unwrap();
        let d_far = log_likelihood(&p, &far).unwrap();
        assert!(d_near > 0.0);
        assert!(d_far > d_near, "near {d_near} far {d_far}");
        assert!(d_far.is_finite());
    }

    #[test]
    fn log_likelihood_floors_disjoint_support() {
        let p = [0.0, 0.1, 0.2, 0.3];
        let q = [100.0, 100.1, 100.2, 100.3];
        let d = log_likelihood(&p, &q).unwrap();
        assert!(d.is_finite());
        assert!(d > 20.0, "llh {d}");
    }

    #[test]
    fn log_likelihood_rejects_constant_test_batch() {
        assert!(matches!(
            log_likelihood(&[0.0, 1.0], &[2.0, 2.0]),
            Err(DriftError::DegenerateWindow { .. })
        ));
        assert_eq!(log_likelihood(&[], &[1.0]), Err(DriftError::EmptyBatch));
    }

    fn estimate(density: [f64; 4]) -> DensityEstimate {
        DensityEstimate {
            points: vec![0.0, 1.0, 2.0, 3.0],
            density: density.to_vec(),
        }
    }

    #[test]
    fn score_is_the_plain_divergence() {
        let reference = estimate([0.2, 0.3, 0.3, 0.2]);
        let test = estimate([0.4, 0.1, 0.1, 0.4]);

        let area = DivergenceMetric::Intersection
            .score(&reference, &test)
            .unwrap();
        assert!((area - 0.4).abs() < 1e-15, "intersection {area}");

        let kl = DivergenceMetric::Kl.score(&reference, &test).unwrap();
        let expected = kl_symmetric(&reference.density, &test.density).unwrap();
        assert_eq!(kl, expected);
    }

    #[test]
    fn mean_score_divides_by_entries() {
        let reference = estimate([0.2, 0.3, 0.3, 0.2]);
        let test = estimate([0.4, 0.1, 0.1, 0.4]);
        for metric in [DivergenceMetric::Kl, DivergenceMetric::Intersection] {
            let total = metric.score(&reference, &test).unwrap();
            let mean = metric.mean_score(&reference, &test).unwrap();
            assert!((mean - total / 4.0).abs() < 1e-15, "{metric}");
        }

        let llh = DivergenceMetric::LogLikelihood;
        assert_eq!(
            llh.mean_score(&reference, &test).unwrap(),
            llh.score(&reference, &test).unwrap()
        );
        assert_eq!(llh.score(&reference, &reference).unwrap(), 0.0);
    }
}
