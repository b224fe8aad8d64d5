use std::path::{Path, PathBuf};

use driftwatch_core::{PcaCdConfig, Phase};
use driftwatch_harness::structured_log::{self, ArtifactIndex, LogEmitter, LogEntry, events};
use driftwatch_harness::{HarnessError, read_csv, replay};

#[derive(Clone, Copy, Debug)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    fn next_open01(&mut self) -> f64 {
        ((self.next_u64() >> 11) as f64 + 0.5) / (1_u64 << 53) as f64
    }

    fn normal(&mut self, sd: f64) -> f64 {
        let u1 = self.next_open01();
        let u2 = self.next_open01();
        sd * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("driftwatch-{name}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// 200 observations with sd 1, then 500 with sd 5, three features.
fn write_stream(path: &Path) {
    let mut rng = XorShift64::new(0xBF58_476D_1CE4_E5B9);
    let mut csv = String::from("f0,f1,f2\n");
    for i in 0..700 {
        let sd = if i < 200 { 1.0 } else { 5.0 };
        let row: Vec<String> = (0..3).map(|_| rng.normal(sd).to_string()).collect();
        csv.push_str(&row.join(","));
        csv.push('\n');
    }
    std::fs::write(path, csv).unwrap();
}

#[test]
fn replay_log_passes_validation() {
    let dir = scratch_dir("replay");
    let input = dir.join("stream.csv");
    let log = dir.join("replay.jsonl");
    write_stream(&input);

    let rows = read_csv(&input).unwrap();
    assert_eq!(rows.len(), 700);

    let cfg = PcaCdConfig::new(100)
        .with_sample_period(0.01)
        .with_track_state(true);
    let emitter = LogEmitter::to_file(&log, "pca_cd", "it-1").unwrap();
    let report = replay(&rows, cfg, emitter, Some(input.as_path())).unwrap();

    assert_eq!(report.observations, 700);
    assert!(!report.drift_samples.is_empty(), "no drift after sd 1 -> 5");
    assert!(report.drift_samples.iter().all(|&s| s >= 200));
    assert_eq!(report.drifts.len(), report.drift_samples.len());

    let (lines, errors) = structured_log::validate_log_file(&log).unwrap();
    assert!(errors.is_empty(), "{}", errors[0]);

    let content = std::fs::read_to_string(&log).unwrap();
    let entries: Vec<LogEntry> = content
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(entries.len(), lines);
    assert_eq!(entries[0].event, events::REPLAY_START);
    assert_eq!(entries[lines - 1].event, events::REPLAY_COMPLETE);
    assert!(entries.iter().any(|e| e.event == events::EPOCH_FITTED));

    let drift_entries: Vec<&LogEntry> = entries
        .iter()
        .filter(|e| e.event == events::DRIFT)
        .collect();
    let drifts: Vec<u64> = drift_entries.iter().filter_map(|e| e.sample).collect();
    assert_eq!(drifts, report.drift_samples);
    // The windows are already promoted when a drift is logged; the entry
    // still names the projection that scored it.
    for entry in &drift_entries {
        assert_eq!(entry.phase, Some(Phase::BuildingReference));
        assert!(
            entry.num_pcs.is_some_and(|k| (1..=3).contains(&k)),
            "drift at {:?} has no projection size",
            entry.sample
        );
    }

    let evaluations = entries
        .iter()
        .filter(|e| e.event == events::EVALUATION)
        .count() as u64;
    assert_eq!(evaluations, report.evaluations);

    // Trace ids are sequential within the run.
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.trace_id, format!("pca_cd::it-1::{:03}", i + 1));
    }
}

#[test]
fn artifact_index_detects_tampering() {
    let dir = scratch_dir("index");
    let input = dir.join("stream.csv");
    write_stream(&input);

    let mut index = ArtifactIndex::new("it-2");
    index.add_file(&input, "input").unwrap();
    assert!(index.stale_artifacts().is_empty());
    assert_eq!(index.artifacts[0].size_bytes, std::fs::metadata(&input).unwrap().len());

    std::fs::write(&input, "1,2,3\n").unwrap();
    assert_eq!(index.stale_artifacts(), vec![index.artifacts[0].path.as_str()]);
}

#[test]
fn malformed_stream_reports_line() {
    let dir = scratch_dir("malformed");
    let input = dir.join("bad.csv");
    std::fs::write(&input, "a,b\n1,2\n3,x\n").unwrap();
    match read_csv(&input) {
        Err(HarnessError::Csv { line, .. }) => assert_eq!(line, 3),
        other => panic!("expected csv error, got {other:?}"),
    }

    let empty = dir.join("empty.csv");
    std::fs::write(&empty, "# nothing here\n").unwrap();
    assert!(matches!(read_csv(&empty), Err(HarnessError::EmptyInput(_))));
}
