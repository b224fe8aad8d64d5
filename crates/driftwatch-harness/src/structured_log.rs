//! JSONL log contract for replay runs.
//!
//! Every line is one [`LogEntry`]. The required fields are `timestamp`,
//! `trace_id`, `level` and `event`; trace ids read
//! `<detector>::<run_id>::<seq>` with a numeric, strictly increasing `seq`.
//! Scored events (`divergence_evaluated`, `drift_detected`) must also carry
//! `sample` and `score`, and a drift event must carry `state: "drift"`.
//!
//! [`ArtifactIndex`] pins the files a run produced by SHA-256 so a later
//! reader can tell whether any of them changed.

use std::io::Write;
use std::path::Path;

use driftwatch_core::{DriftState, Phase};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// How a run, or a rejected observation, ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Error,
}

/// Event names with a field contract enforced by [`validate_log_line`].
pub mod events {
    pub const REPLAY_START: &str = "replay_start";
    pub const EPOCH_FITTED: &str = "epoch_fitted";
    pub const EVALUATION: &str = "divergence_evaluated";
    pub const DRIFT: &str = "drift_detected";
    pub const REJECTED: &str = "observation_rejected";
    pub const REPLAY_COMPLETE: &str = "replay_complete";
}

const REQUIRED: [&str; 4] = ["timestamp", "trace_id", "level", "event"];

/// One line of a replay log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub trace_id: String,
    pub level: LogLevel,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Detector kind, e.g. `pca_cd`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detector: Option<String>,
    /// Zero-based index of the observation this entry is about.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<DriftState>,
    /// Reduced divergence score.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Per-dimension divergence scores.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scores: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_pcs: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl LogEntry {
    #[must_use]
    pub fn with_sample(mut self, sample: u64) -> Self {
        self.sample = Some(sample);
        self
    }

    #[must_use]
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    #[must_use]
    pub fn with_state(mut self, state: DriftState) -> Self {
        self.state = Some(state);
        self
    }

    /// Set the reduced score and, optionally, the per-dimension scores.
    #[must_use]
    pub fn with_score(mut self, score: f64, scores: Option<Vec<f64>>) -> Self {
        self.score = Some(score);
        self.scores = scores;
        self
    }

    #[must_use]
    pub fn with_num_pcs(mut self, num_pcs: usize) -> Self {
        self.num_pcs = Some(num_pcs);
        self
    }

    #[must_use]
    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    #[must_use]
    pub fn with_duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// One file pinned by an [`ArtifactIndex`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub path: String,
    /// Role of the file in the run: `input`, `log` or `report`.
    pub kind: String,
    pub sha256: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactIndex {
    pub index_version: u32,
    pub run_id: String,
    pub generated_utc: String,
    pub artifacts: Vec<ArtifactEntry>,
}

impl ArtifactIndex {
    #[must_use]
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            index_version: 1,
            run_id: run_id.into(),
            generated_utc: now_utc(),
            artifacts: Vec::new(),
        }
    }

    /// Hash the file at `path` and pin it under `kind`.
    pub fn add_file(&mut self, path: &Path, kind: &str) -> std::io::Result<()> {
        let data = std::fs::read(path)?;
        self.artifacts.push(ArtifactEntry {
            path: path.display().to_string(),
            kind: kind.to_string(),
            sha256: sha256_hex(&data),
            size_bytes: data.len() as u64,
        });
        Ok(())
    }

    /// Paths whose current digest differs from the pinned one. Unreadable
    /// files count as changed.
    #[must_use]
    pub fn stale_artifacts(&self) -> Vec<&str> {
        self.artifacts
            .iter()
            .filter(|art| {
                !std::fs::read(&art.path)
                    .is_ok_and(|data| sha256_hex(&data).eq_ignore_ascii_case(&art.sha256))
            })
            .map(|art| art.path.as_str())
            .collect()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Lowercase hex SHA-256 of `data`.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    Sha256::digest(data)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Writes one run's entries as JSONL, numbering them as it goes.
pub struct LogEmitter {
    writer: Box<dyn Write>,
    seq: u64,
    detector: String,
    run_id: String,
}

impl LogEmitter {
    pub fn to_file(path: &Path, detector: &str, run_id: &str) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::to_writer(
            std::io::BufWriter::new(file),
            detector,
            run_id,
        ))
    }

    #[must_use]
    pub fn to_writer(writer: impl Write + 'static, detector: &str, run_id: &str) -> Self {
        Self {
            writer: Box::new(writer),
            seq: 0,
            detector: detector.to_string(),
            run_id: run_id.to_string(),
        }
    }

    /// An emitter that discards everything.
    #[must_use]
    pub fn sink(detector: &str, run_id: &str) -> Self {
        Self::to_writer(std::io::sink(), detector, run_id)
    }

    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Start the next entry of this run. Entries must be emitted in the
    /// order they were started.
    pub fn entry(&mut self, level: LogLevel, event: &str) -> LogEntry {
        self.seq += 1;
        LogEntry {
            timestamp: now_utc(),
            trace_id: format!("{}::{}::{:03}", self.detector, self.run_id, self.seq),
            level,
            event: event.to_string(),
            run_id: Some(self.run_id.clone()),
            detector: Some(self.detector.clone()),
            sample: None,
            phase: None,
            state: None,
            score: None,
            scores: None,
            num_pcs: None,
            outcome: None,
            duration_ms: None,
            details: None,
        }
    }

    pub fn emit(&mut self, entry: &LogEntry) -> std::io::Result<()> {
        let line = serde_json::to_string(entry).map_err(std::io::Error::other)?;
        writeln!(self.writer, "{line}")
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

/// A contract violation on one log line.
#[derive(Debug)]
pub struct LogValidationError {
    pub line_number: usize,
    pub field: &'static str,
    pub message: String,
}

impl std::fmt::Display for LogValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "line {}: field '{}': {}",
            self.line_number, self.field, self.message
        )
    }
}

/// Check one line against the contract and parse it.
///
/// All violations on the line are reported together.
pub fn validate_log_line(line: &str, line_number: usize) -> Result<LogEntry, Vec<LogValidationError>> {
    let violation = |field: &'static str, message: String| LogValidationError {
        line_number,
        field,
        message,
    };

    let value: Value = serde_json::from_str(line)
        .map_err(|e| vec![violation("<json>", format!("invalid JSON: {e}"))])?;
    let Some(obj) = value.as_object() else {
        return Err(vec![violation("<root>", "expected JSON object".to_string())]);
    };

    let mut errors: Vec<LogValidationError> = REQUIRED
        .into_iter()
        .filter(|field| !obj.contains_key(*field))
        .map(|field| violation(field, "required field missing".to_string()))
        .collect();

    let variants = [
        ("level", invalid_variant::<LogLevel>(obj, "level")),
        ("outcome", invalid_variant::<Outcome>(obj, "outcome")),
        ("state", invalid_variant::<DriftState>(obj, "state")),
        ("phase", invalid_variant::<Phase>(obj, "phase")),
    ];
    errors.extend(
        variants
            .into_iter()
            .filter_map(|(field, message)| message.map(|m| violation(field, m))),
    );

    if let Some(score) = obj.get("score").and_then(Value::as_f64)
        && score < 0.0
    {
        errors.push(violation("score", format!("divergence scores are non-negative, got {score}")));
    }

    let event = obj.get("event").and_then(Value::as_str).unwrap_or_default();
    if event == events::EVALUATION || event == events::DRIFT {
        for field in ["sample", "score"] {
            if !obj.get(field).is_some_and(Value::is_number) {
                errors.push(violation(field, format!("{event} events must include numeric {field}")));
            }
        }
    }
    if event == events::DRIFT && obj.get("state").and_then(Value::as_str) != Some("drift") {
        errors.push(violation("state", format!("{event} events must carry state 'drift'")));
    }

    if let Some(trace_id) = obj.get("trace_id").and_then(Value::as_str)
        && !is_trace_id(trace_id)
    {
        errors.push(violation(
            "trace_id",
            format!("expected <detector>::<run_id>::<seq>, got '{trace_id}'"),
        ));
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    serde_json::from_value(value)
        .map_err(|e| vec![violation("<entry>", format!("failed to deserialize: {e}"))])
}

/// Validate every non-blank line of a log file. Returns the number of lines
/// checked and all violations found.
pub fn validate_log_file(path: &Path) -> std::io::Result<(usize, Vec<LogValidationError>)> {
    let content = std::fs::read_to_string(path)?;
    let lines: Vec<(usize, &str)> = content
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
        .collect();
    let errors = lines
        .iter()
        .filter_map(|&(number, line)| validate_log_line(line, number).err())
        .flatten()
        .collect();
    Ok((lines.len(), errors))
}

/// `Some(message)` when `field` is present but is not a variant of `T`.
fn invalid_variant<T: DeserializeOwned>(obj: &Map<String, Value>, field: &str) -> Option<String> {
    let value = obj.get(field)?;
    T::deserialize(value)
        .is_err()
        .then(|| format!("invalid {field}: {value}"))
}

fn is_trace_id(id: &str) -> bool {
    let Some((context, seq)) = id.rsplit_once("::") else {
        return false;
    };
    let Some((detector, run_id)) = context.split_once("::") else {
        return false;
    };
    !detector.is_empty()
        && !run_id.is_empty()
        && !seq.is_empty()
        && seq.bytes().all(|b| b.is_ascii_digit())
}

/// Current UTC time as RFC 3339 with millisecond precision.
#[must_use]
pub fn now_utc() -> String {
    let duration = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format_utc(duration.as_secs(), duration.subsec_millis())
}

fn format_utc(secs: u64, millis: u32) -> String {
    let days = (secs / 86_400) as i64;
    let rem = secs % 86_400;
    let (year, month, day) = civil_from_days(days);
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{millis:03}Z",
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60,
    )
}

/// Days since 1970-01-01 to a proleptic Gregorian (year, month, day).
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}
