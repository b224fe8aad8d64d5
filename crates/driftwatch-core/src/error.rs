//! Error type shared by every detector in the crate.
//!
//! Configuration and precondition violations surface here. Numerical edge
//! cases (zero-density bins, early burn-in statistics) are recovered locally
//! and never become errors.

use thiserror::Error;

/// Errors raised by detector configuration and update paths.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DriftError {
    #[error("observation has {got} features, window expects {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("observation has no features")]
    EmptyObservation,

    #[error("non-finite value at feature {index}")]
    NonFiniteValue { index: usize },

    #[error("batch is empty")]
    EmptyBatch,

    #[error("batch row {row} has {got} features, expected {expected}")]
    RaggedBatch {
        row: usize,
        expected: usize,
        got: usize,
    },

    #[error("degenerate window of {len} values: {reason}")]
    DegenerateWindow { len: usize, reason: &'static str },

    #[error("windows are not ready for scoring (phase: {0})")]
    WindowNotReady(&'static str),

    #[error("aligned vectors have different lengths: {0} vs {1}")]
    LengthMismatch(usize, usize),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown {option} option: '{value}'")]
    UnknownOption {
        option: &'static str,
        value: String,
    },
}

pub type Result<T> = std::result::Result<T, DriftError>;

/// Fails with [`DriftError::NonFiniteValue`] on the first NaN or infinity.
pub(crate) fn ensure_finite(values: &[f64]) -> Result<()> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(DriftError::NonFiniteValue { index }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_violated_constraint() {
        let err = DriftError::DimensionMismatch {
            expected: 4,
            got: 3,
        };
        assert_eq!(
            err.to_string(),
            "observation has 3 features, window expects 4"
        );

        let err = DriftError::UnknownOption {
            option: "density",
            value: "gaussian".to_string(),
        };
        assert_eq!(err.to_string(), "unknown density option: 'gaussian'");
    }

    #[test]
    fn ensure_finite_reports_first_offender() {
        assert!(ensure_finite(&[0.0, 1.0, -2.5]).is_ok());
        assert_eq!(
            ensure_finite(&[0.0, f64::NAN, f64::INFINITY]),
            Err(DriftError::NonFiniteValue { index: 1 })
        );
    }
}
