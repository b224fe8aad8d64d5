//! Concept drift detectors that watch a classifier's error stream.

pub mod eddm;

pub use eddm::Eddm;
