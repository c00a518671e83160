//! # mediatree probe
//!
//! Parses container files and prints their media records as JSON.
//!
//! ```text
//! mediatree-probe [--config FILE] [--structure] [--samples] [--jobs N] FILE...
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use mediatree_core::{Demuxer, MediaFile, ParseOptions, StructureDump};
use parking_lot::Mutex;
use serde::Serialize;

const USAGE: &str = "usage: mediatree-probe [--config FILE] [--structure] [--samples] [--jobs N] FILE...";

// ============================================================================
// Arguments
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
struct ProbeOptions {
    config: Option<PathBuf>,
    structure: bool,
    samples: bool,
    jobs: usize,
    inputs: Vec<PathBuf>,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            config: None,
            structure: false,
            samples: false,
            jobs: std::thread::available_parallelism().map_or(1, |n| n.get()),
            inputs: Vec::new(),
        }
    }
}

fn parse_args(args: &[String]) -> Result<ProbeOptions> {
    let mut options = ProbeOptions::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow::anyhow!("Missing value for --config"))?;
                options.config = Some(PathBuf::from(value));
                i += 2;
            }
            "--jobs" | "-j" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow::anyhow!("Missing value for --jobs"))?;
                let jobs: usize = value
                    .parse()
                    .with_context(|| format!("Invalid --jobs value {:?}", value))?;
                options.jobs = jobs.max(1);
                i += 2;
            }
            "--structure" | "-s" => {
                options.structure = true;
                i += 1;
            }
            "--samples" => {
                options.samples = true;
                i += 1;
            }
            "--help" | "-h" => {
                anyhow::bail!(USAGE);
            }
            flag if flag.starts_with('-') && flag.len() > 1 => {
                anyhow::bail!("Unknown option {:?}\n{}", flag, USAGE);
            }
            path => {
                options.inputs.push(PathBuf::from(path));
                i += 1;
            }
        }
    }

    if options.inputs.is_empty() {
        anyhow::bail!("No input files\n{}", USAGE);
    }
    Ok(options)
}

// ============================================================================
// Probing
// ============================================================================

#[derive(Debug, Serialize)]
struct Report {
    path: String,
    #[serde(flatten)]
    media: MediaFile,
    #[serde(skip_serializing_if = "Option::is_none")]
    structure: Option<StructureDump>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Outcome {
    Parsed(Report),
    Failed { path: String, error: String },
}

impl Outcome {
    fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }
}

fn probe_file(demuxer: &Demuxer, path: &Path, options: &ProbeOptions) -> Result<Outcome> {
    let data = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;

    let mut dump = StructureDump::new();
    let mut media = if options.structure {
        demuxer.parse_traced(data, &mut dump)
    } else {
        demuxer.parse(data)
    }
    .with_context(|| format!("Failed to parse {}", path.display()))?;

    for track in &media.tracks {
        tracing::info!(
            file = %path.display(),
            track = track.id,
            kind = ?track.kind,
            codec = ?track.codec,
            samples = track.sample_count(),
            sync = track.sync_sample_count(),
            status = ?track.index_status,
            "track"
        );
    }
    if !options.samples {
        for track in &mut media.tracks {
            track.samples.clear();
        }
    }

    Ok(Outcome::Parsed(Report {
        path: path.display().to_string(),
        media,
        structure: options.structure.then_some(dump),
    }))
}

/// Parse every input on a pool of scoped threads; results keep input order.
fn probe_all(demuxer: &Demuxer, options: &ProbeOptions) -> Vec<Outcome> {
    let inputs = &options.inputs;
    let next = AtomicUsize::new(0);
    let results: Mutex<Vec<Option<Outcome>>> = Mutex::new((0..inputs.len()).map(|_| None).collect());
    let workers = options.jobs.min(inputs.len()).max(1);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let i = next.fetch_add(1, Ordering::Relaxed);
                let Some(path) = inputs.get(i) else {
                    break;
                };
                let outcome = probe_file(demuxer, path, options).unwrap_or_else(|e| {
                    tracing::error!(file = %path.display(), "{:#}", e);
                    Outcome::Failed {
                        path: path.display().to_string(),
                        error: format!("{:#}", e),
                    }
                });
                results.lock()[i] = Some(outcome);
            });
        }
    });

    results.into_inner().into_iter().flatten().collect()
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("mediatree=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let options = parse_args(&args)?;

    let parse_options = match &options.config {
        Some(path) => ParseOptions::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ParseOptions::default(),
    };
    tracing::debug!(?parse_options, jobs = options.jobs, "mediatree-probe v{}", mediatree_core::VERSION);

    let demuxer = Demuxer::new(parse_options);
    let outcomes = probe_all(&demuxer, &options);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, &outcomes)?;
    writeln!(out)?;

    let failed = outcomes.iter().filter(|o| o.is_failure()).count();
    if failed > 0 {
        anyhow::bail!("{} of {} files failed", failed, outcomes.len());
    }
    Ok(())
}
