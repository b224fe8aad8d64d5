//! Distribution-based drift detection over multivariate windows.
//!
//! Leaf-first: [`density`] estimates one projected dimension, [`divergence`]
//! compares two estimates, [`scaler`] and [`projection`] are the per-epoch
//! models, [`window`] owns the windows and the epoch, and [`pca_cd`] drives
//! it all one observation at a time.

pub mod density;
pub mod divergence;
pub mod pca_cd;
pub mod projection;
pub mod scaler;
pub mod window;

use crate::error::{DriftError, Result};

pub use density::{DensityEstimate, DensityKind};
pub use divergence::DivergenceMetric;
pub use pca_cd::PcaCd;
pub use projection::Pca;
pub use scaler::StandardScaler;
pub use window::{Phase, WindowManager};

/// Fails with [`DriftError::DimensionMismatch`] unless `row` has `expected`
/// features.
pub(crate) fn check_row(row: &[f64], expected: usize) -> Result<()> {
    if row.len() != expected {
        return Err(DriftError::DimensionMismatch {
            expected,
            got: row.len(),
        });
    }
    Ok(())
}
