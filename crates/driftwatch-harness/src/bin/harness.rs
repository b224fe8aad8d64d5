//! CLI entrypoint for the driftwatch replay harness.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use driftwatch_core::{DensityKind, DivergenceMetric, PcaCdConfig};
use driftwatch_harness::structured_log::{self, ArtifactIndex, LogEmitter};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

/// Replay tooling for driftwatch detectors.
#[derive(Debug, Parser)]
#[command(name = "driftwatch-harness")]
#[command(about = "Replay recorded streams through driftwatch detectors")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay a CSV stream through PCA-CD.
    Replay {
        /// CSV file with one observation per line.
        #[arg(long)]
        input: PathBuf,
        /// JSON detector configuration. Flags below override its fields.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Reference/test window length (100 without a config file).
        #[arg(long)]
        window_size: Option<usize>,
        /// Density estimator: kde or histogram.
        #[arg(long)]
        density: Option<String>,
        /// Divergence metric: kl, llh or intersection.
        #[arg(long)]
        divergence: Option<String>,
        /// Evaluation cadence as a fraction of the window size.
        #[arg(long)]
        sample_period: Option<f64>,
        /// Page-Hinkley sensitivity.
        #[arg(long)]
        delta: Option<f64>,
        /// Cumulative explained-variance ratio to retain.
        #[arg(long)]
        ev_threshold: Option<f64>,
        /// Standardize features on the reference window.
        #[arg(long)]
        online_scaling: bool,
        /// Record monitor snapshots at every drift.
        #[arg(long)]
        track_state: bool,
        /// Score unit-free, rank-aligned, per-entry divergences.
        #[arg(long)]
        normalized_scores: bool,
        /// Run identifier used in trace ids (defaults to a timestamp).
        #[arg(long)]
        run_id: Option<String>,
        /// Structured JSONL log output.
        #[arg(long)]
        log: Option<PathBuf>,
        /// Summary report JSON output (if omitted, prints to stdout).
        #[arg(long)]
        report: Option<PathBuf>,
        /// Artifact index JSON output; pins the log and report by SHA-256.
        #[arg(long)]
        artifact_index: Option<PathBuf>,
    },
    /// Validate a structured JSONL log.
    ValidateLog {
        #[arg(long)]
        log: PathBuf,
    },
}

#[derive(Debug, Default)]
struct Overrides {
    window_size: Option<usize>,
    density: Option<String>,
    divergence: Option<String>,
    sample_period: Option<f64>,
    delta: Option<f64>,
    ev_threshold: Option<f64>,
    online_scaling: bool,
    track_state: bool,
    normalized_scores: bool,
}

fn build_config(
    path: Option<&Path>,
    overrides: Overrides,
) -> Result<PcaCdConfig, Box<dyn std::error::Error>> {
    let mut config = match path {
        Some(path) => driftwatch_harness::load_config(path)?,
        None => PcaCdConfig::new(100),
    };
    if let Some(w) = overrides.window_size {
        config.window_size = w;
    }
    if let Some(d) = overrides.density {
        config.density = d.parse::<DensityKind>()?;
    }
    if let Some(m) = overrides.divergence {
        config.divergence_metric = m.parse::<DivergenceMetric>()?;
    }
    if let Some(p) = overrides.sample_period {
        config.sample_period = p;
    }
    if let Some(d) = overrides.delta {
        config.delta = d;
    }
    if let Some(t) = overrides.ev_threshold {
        config.ev_threshold = t;
    }
    config.online_scaling |= overrides.online_scaling;
    config.track_state |= overrides.track_state;
    if overrides.normalized_scores {
        config = config.with_normalized_scores(true);
    }
    config.validate()?;
    Ok(config)
}

fn default_run_id() -> String {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("replay-{secs}")
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter =
        EnvFilter::try_from_env("DRIFTWATCH_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Replay {
            input,
            config,
            window_size,
            density,
            divergence,
            sample_period,
            delta,
            ev_threshold,
            online_scaling,
            track_state,
            normalized_scores,
            run_id,
            log,
            report,
            artifact_index,
        } => {
            let overrides = Overrides {
                window_size,
                density,
                divergence,
                sample_period,
                delta,
                ev_threshold,
                online_scaling,
                track_state,
                normalized_scores,
            };
            let config = build_config(config.as_deref(), overrides)?;
            let rows = driftwatch_harness::read_csv(&input)?;
            let run_id = run_id.unwrap_or_else(default_run_id);

            let emitter = match &log {
                Some(path) => LogEmitter::to_file(path, "pca_cd", &run_id)?,
                None => LogEmitter::sink("pca_cd", &run_id),
            };
            let summary =
                driftwatch_harness::replay(&rows, config, emitter, Some(input.as_path()))?;
            info!(
                observations = summary.observations,
                evaluations = summary.evaluations,
                drifts = summary.drift_samples.len(),
                "replay finished"
            );

            let json = summary.to_json()?;
            match &report {
                Some(path) => std::fs::write(path, &json)?,
                None => println!("{json}"),
            }

            if let Some(index_path) = artifact_index {
                let mut index = ArtifactIndex::new(&run_id);
                index.add_file(&input, "input")?;
                if let Some(path) = &log {
                    index.add_file(path, "log")?;
                }
                if let Some(path) = &report {
                    index.add_file(path, "report")?;
                }
                std::fs::write(&index_path, index.to_json()?)?;
                eprintln!("Wrote artifact index to {}", index_path.display());
            }
        }
        Command::ValidateLog { log } => {
            let (lines, errors) = structured_log::validate_log_file(&log)?;
            if errors.is_empty() {
                println!("{}: {lines} lines, all valid", log.display());
            } else {
                for err in &errors {
                    eprintln!("{err}");
                }
                return Err(format!(
                    "{} validation error(s) in {} lines of {}",
                    errors.len(),
                    lines,
                    log.display()
                )
                .into());
            }
        }
    }

    Ok(())
}
