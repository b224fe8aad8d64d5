//! Replay tooling for driftwatch detectors.
//!
//! This crate provides:
//! - A JSONL structured-log contract for replay runs, with a validator
//! - A CSV stream reader and a replay driver for PCA-CD
//! - An artifact index that pins every output file by SHA-256

#![forbid(unsafe_code)]

pub mod error;
pub mod replay;
pub mod structured_log;

pub use error::HarnessError;
pub use replay::{ReplayReport, Replayer, load_config, read_csv, replay};
pub use structured_log::{ArtifactIndex, LogEmitter, LogEntry, LogLevel, Outcome};
