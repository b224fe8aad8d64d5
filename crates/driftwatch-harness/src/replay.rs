//! Replay a recorded multivariate stream through PCA-CD.
//!
//! Input is a CSV file with one observation per line. An optional header
//! line, blank lines and `#` comments are skipped. Every row must have the
//! same width, and every value must be a finite number.
//!
//! The [`Replayer`] mirrors each detector transition into the structured
//! log: the start of the run, each epoch fit, each evaluation, each drift,
//! and a rejected observation if the stream turns out to be malformed.

use std::path::{Path, PathBuf};
use std::time::Instant;

use driftwatch_core::{
    DriftDetector, DriftRecord, DriftState, PcaCd, PcaCdConfig, Phase, ScoreMonitor,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::HarnessError;
use crate::structured_log::{LogEmitter, LogLevel, Outcome, events};

/// Read a CSV stream into rows.
pub fn read_csv(path: &Path) -> Result<Vec<Vec<f64>>, HarnessError> {
    let content = std::fs::read_to_string(path).map_err(|e| HarnessError::io(path, e))?;
    let rows = parse_csv(&content).map_err(|(line, message)| HarnessError::Csv {
        path: path.to_path_buf(),
        line,
        message,
    })?;
    if rows.is_empty() {
        return Err(HarnessError::EmptyInput(path.to_path_buf()));
    }
    debug!(path = %path.display(), rows = rows.len(), "stream loaded");
    Ok(rows)
}

/// Parse CSV text. Errors carry the 1-based line number.
fn parse_csv(content: &str) -> Result<Vec<Vec<f64>>, (usize, String)> {
    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut header_seen = false;

    for (i, raw) in content.lines().enumerate() {
        let line_number = i + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let parsed: Result<Vec<f64>, _> = fields.iter().map(|f| f.parse::<f64>()).collect();
        let row = match parsed {
            Ok(row) => row,
            Err(_) if rows.is_empty() && !header_seen => {
                header_seen = true;
                continue;
            }
            Err(e) => return Err((line_number, format!("not a number: {e}"))),
        };
        if let Some(col) = row.iter().position(|v| !v.is_finite()) {
            return Err((line_number, format!("non-finite value in column {}", col + 1)));
        }
        if let Some(first) = rows.first()
            && first.len() != row.len()
        {
            return Err((
                line_number,
                format!("expected {} columns, found {}", first.len(), row.len()),
            ));
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Load a detector configuration from a JSON file.
pub fn load_config(path: &Path) -> Result<PcaCdConfig, HarnessError> {
    let content = std::fs::read_to_string(path).map_err(|e| HarnessError::io(path, e))?;
    let config: PcaCdConfig =
        serde_json::from_str(&content).map_err(|source| HarnessError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    config.validate()?;
    Ok(config)
}

/// Summary of a finished replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayReport {
    pub run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<PathBuf>,
    pub config: PcaCdConfig,
    pub observations: u64,
    pub evaluations: u64,
    /// Observation indices at which drift was reported.
    pub drift_samples: Vec<u64>,
    /// Monitor snapshots per drift (populated with `track_state`).
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub drifts: Vec<DriftRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_pcs: Option<usize>,
    pub final_phase: Phase,
    pub duration_ms: u64,
}

impl ReplayReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Drives a PCA-CD detector and logs every transition.
pub struct Replayer {
    detector: PcaCd,
    emitter: LogEmitter,
    evaluations: u64,
    drift_samples: Vec<u64>,
    max_score: Option<f64>,
    started: Instant,
}

impl Replayer {
    /// Build the detector and log the start of the run.
    pub fn new(config: PcaCdConfig, mut emitter: LogEmitter) -> Result<Self, HarnessError> {
        let config_json = serde_json::to_value(&config)?;
        let detector = PcaCd::new(config)?;
        let entry = emitter
            .entry(LogLevel::Info, events::REPLAY_START)
            .with_phase(detector.phase())
            .with_details(serde_json::json!({
                "config": config_json,
                "step": detector.step(),
                "monitor_threshold": detector.monitor_threshold(),
            }));
        emitter.emit(&entry)?;
        Ok(Self {
            detector,
            emitter,
            evaluations: 0,
            drift_samples: Vec::new(),
            max_score: None,
            started: Instant::now(),
        })
    }

    #[must_use]
    pub fn detector(&self) -> &PcaCd {
        &self.detector
    }

    /// Feed one observation.
    ///
    /// A rejected observation is logged before the error is returned.
    pub fn observe(&mut self, observation: &[f64]) -> Result<DriftState, HarnessError> {
        let sample = self.detector.total_samples();
        let phase_before = self.detector.phase();
        // A drift promotes the test window and drops the epoch that scored it.
        let num_pcs = self.detector.num_pcs();
        let due = phase_before == Phase::Monitoring
            && sample != 0
            && sample % self.detector.step() == 0;

        let state = match self.detector.update(observation) {
            Ok(state) => state,
            Err(source) => {
                let entry = self
                    .emitter
                    .entry(LogLevel::Error, events::REJECTED)
                    .with_sample(sample)
                    .with_phase(phase_before)
                    .with_outcome(Outcome::Error)
                    .with_details(serde_json::json!({ "error": source.to_string() }));
                self.emitter.emit(&entry)?;
                return Err(HarnessError::Detector { sample, source });
            }
        };

        if phase_before != Phase::Monitoring && self.detector.phase() == Phase::Monitoring {
            self.log_epoch(sample)?;
        }
        if due && let Some(score) = self.detector.last_score() {
            self.evaluations += 1;
            self.max_score = Some(self.max_score.map_or(score, |m| m.max(score)));
            let entry = self
                .emitter
                .entry(LogLevel::Debug, events::EVALUATION)
                .with_sample(sample)
                .with_phase(Phase::Monitoring)
                .with_state(state)
                .with_score(score, Some(self.detector.last_scores().to_vec()));
            self.emitter.emit(&entry)?;
        }
        if state.is_drift() {
            self.log_drift(sample, num_pcs)?;
        }
        Ok(state)
    }

    fn log_epoch(&mut self, sample: u64) -> Result<(), HarnessError> {
        let windows = self.detector.windows();
        let mut entry = self
            .emitter
            .entry(LogLevel::Info, events::EPOCH_FITTED)
            .with_sample(sample)
            .with_phase(Phase::Monitoring);
        if let Some(k) = windows.num_components() {
            entry = entry.with_num_pcs(k);
        }
        if let Some(ratios) = windows.explained_variance_ratio() {
            entry = entry.with_details(serde_json::json!({ "explained_variance_ratio": ratios }));
        }
        self.emitter.emit(&entry)?;
        Ok(())
    }

    fn log_drift(&mut self, sample: u64, num_pcs: Option<usize>) -> Result<(), HarnessError> {
        self.drift_samples.push(sample);
        let snapshot = serde_json::to_value(self.detector.monitor().snapshot())?;
        let mut entry = self
            .emitter
            .entry(LogLevel::Warn, events::DRIFT)
            .with_sample(sample)
            .with_phase(self.detector.phase())
            .with_state(DriftState::Drift)
            .with_score(self.detector.last_score().unwrap_or_default(), None)
            .with_details(serde_json::json!({ "monitor": snapshot }));
        if let Some(k) = num_pcs {
            entry = entry.with_num_pcs(k);
        }
        self.emitter.emit(&entry)?;
        Ok(())
    }

    /// Log the end of the run and return its summary.
    pub fn finish(mut self, input: Option<&Path>) -> Result<ReplayReport, HarnessError> {
        let duration_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let report = ReplayReport {
            run_id: self.emitter.run_id().to_string(),
            input: input.map(Path::to_path_buf),
            config: self.detector.config().clone(),
            observations: self.detector.total_samples(),
            evaluations: self.evaluations,
            drift_samples: self.drift_samples,
            drifts: self.detector.drift_tracker().to_vec(),
            max_score: self.max_score,
            num_pcs: self.detector.num_pcs(),
            final_phase: self.detector.phase(),
            duration_ms,
        };
        let entry = self
            .emitter
            .entry(LogLevel::Info, events::REPLAY_COMPLETE)
            .with_phase(report.final_phase)
            .with_outcome(Outcome::Pass)
            .with_duration_ms(duration_ms)
            .with_details(serde_json::json!({
                "observations": report.observations,
                "evaluations": report.evaluations,
                "drifts": report.drift_samples.len(),
            }));
        self.emitter.emit(&entry)?;
        self.emitter.flush()?;
        Ok(report)
    }
}

/// Replay `rows` in order and return the summary.
pub fn replay(
    rows: &[Vec<f64>],
    config: PcaCdConfig,
    emitter: LogEmitter,
    input: Option<&Path>,
) -> Result<ReplayReport, HarnessError> {
    let mut replayer = Replayer::new(config, emitter)?;
    for row in rows {
        replayer.observe(row)?;
    }
    replayer.finish(input)
}
