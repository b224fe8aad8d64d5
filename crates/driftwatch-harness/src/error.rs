//! Errors raised by the replay tooling.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path}:{line}: {message}")]
    Csv {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("no observations in {0}")]
    EmptyInput(PathBuf),

    #[error("observation {sample}: {source}")]
    Detector {
        sample: u64,
        #[source]
        source: driftwatch_core::DriftError,
    },

    #[error(transparent)]
    Core(#[from] driftwatch_core::DriftError),

    #[error("log serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("log write failed: {0}")]
    LogWrite(#[from] std::io::Error),
}

impl HarnessError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
