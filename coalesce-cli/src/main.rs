//! CLI for the coalesce metric-sample consolidation engine.
//!
//! Provides commands for consolidating a JSON-lines sample stream into run
//! artifacts, and for benchmarking the write path.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use coalesce::{
    Compression, FinishSummary, MetricDescriptor, MetricNames, Recorder, RecorderConfig, Run, Sample,
};
use serde::Deserialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// coalesce: Streaming run-length consolidation of metric samples.
#[derive(Parser)]
#[command(name = "coalesce", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Consolidate a JSON-lines sample stream into run artifacts.
    ///
    /// Each input line is an object with "desc", "names" and "sample" fields,
    /// plus an optional "id" selecting the run.
    Ingest {
        /// Run id for lines that do not carry their own.
        #[arg(long, default_value = "0")]
        id: String,

        /// Directory receiving the artifacts.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Artifact compression.
        #[arg(long)]
        compression: Option<CompressionArg>,

        /// Keep metrics that only ever reported zero.
        #[arg(long)]
        keep_zero: bool,

        /// JSON configuration file; flags override its fields.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Input file (defaults to stdin).
        input: Option<PathBuf>,
    },

    /// Run a write-path microbenchmark.
    Bench {
        /// Number of samples to log.
        #[arg(long, default_value = "1000000")]
        samples: u64,

        /// Number of distinct metrics.
        #[arg(long, default_value = "30")]
        metrics: u32,

        /// Artifact compression.
        #[arg(long, default_value = "none")]
        compression: CompressionArg,
    },
}

/// Artifact compression accepted on the command line.
#[derive(Clone, Copy, ValueEnum)]
enum CompressionArg {
    /// Plain text.
    None,
    /// Snappy framing format.
    Snappy,
}

impl From<CompressionArg> for Compression {
    fn from(arg: CompressionArg) -> Self {
        match arg {
            CompressionArg::None => Self::None,
            CompressionArg::Snappy => Self::Snappy,
        }
    }
}

/// One line of `ingest` input.
#[derive(Debug, Deserialize)]
struct InputLine {
    #[serde(default)]
    id: Option<String>,
    desc: MetricDescriptor,
    #[serde(default)]
    names: MetricNames,
    sample: Sample,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Ingest {
            id,
            output_dir,
            compression,
            keep_zero,
            config,
            input,
        } => build_config(config.as_deref(), output_dir, compression, keep_zero)
            .and_then(|config| cmd_ingest(config, &id, input.as_deref())),
        Commands::Bench {
            samples,
            metrics,
            compression,
        } => cmd_bench(samples, metrics, compression.into()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Merges the optional config file with command line overrides.
fn build_config(
    path: Option<&Path>,
    output_dir: Option<PathBuf>,
    compression: Option<CompressionArg>,
    keep_zero: bool,
) -> Result<RecorderConfig, Box<dyn std::error::Error>> {
    let mut config = match path {
        Some(path) => RecorderConfig::load(path)?,
        None => RecorderConfig::default(),
    };

    if let Some(dir) = output_dir {
        config.output_dir = dir;
    }
    if let Some(compression) = compression {
        config.compression = compression.into();
    }
    config.keep_constant_zero |= keep_zero;

    Ok(config)
}

/// Implements `coalesce ingest`.
fn cmd_ingest(
    config: RecorderConfig,
    default_id: &str,
    input: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let summaries = match input {
        Some(path) => {
            let file = File::open(path).map_err(|e| format!("cannot open '{}': {e}", path.display()))?;
            ingest_lines(BufReader::new(file), config, default_id)?
        }
        None => ingest_lines(io::stdin().lock(), config, default_id)?,
    };

    for summary in &summaries {
        println!("{}", summary.prefix.display());
    }

    Ok(())
}

/// Logs every line of `reader` and finishes all runs at end of input.
fn ingest_lines<R: BufRead>(
    reader: R,
    config: RecorderConfig,
    default_id: &str,
) -> Result<Vec<FinishSummary>, Box<dyn std::error::Error>> {
    let mut recorder = Recorder::new(config)?;

    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let parsed: InputLine =
            serde_json::from_str(&line).map_err(|e| format!("line {}: {e}", n + 1))?;
        let id = parsed.id.as_deref().unwrap_or(default_id);

        recorder
            .log_sample(id, &parsed.desc, &parsed.names, parsed.sample)
            .map_err(|e| format!("line {}: {e}", n + 1))?;
    }

    debug!(runs = recorder.active_runs().len(), "end of input");
    Ok(recorder.finish_all(false)?)
}

/// Implements `coalesce bench`.
#[allow(clippy::cast_precision_loss)] // Benchmark stats are fine with f64 precision
fn cmd_bench(samples: u64, metric_count: u32, compression: Compression) -> Result<(), Box<dyn std::error::Error>> {
    if metric_count == 0 {
        return Err("--metrics must be at least 1".into());
    }

    println!("coalesce write-path benchmark");
    println!("  Samples: {samples}");
    println!("  Metrics: {metric_count}");
    println!("  Compression: {compression:?}");
    println!();

    let temp_dir = std::env::temp_dir().join("coalesce_bench");
    let _ = std::fs::remove_dir_all(&temp_dir);

    let config = RecorderConfig::new(&temp_dir).with_compression(compression);
    config.prepare()?;
    let mut run = Run::open("bench", &config)?;

    let metrics: Vec<_> = (0..metric_count)
        .map(|i| {
            (
                MetricDescriptor::new("bench", "ops-sec"),
                MetricNames::new().with("id", i.to_string()),
            )
        })
        .collect();

    println!("Logging {samples} samples across {metric_count} metrics...");

    let per_metric = samples / u64::from(metric_count);
    let start = Instant::now();

    for k in 0..per_metric {
        // Value changes every 10 samples.
        let value = ((k / 10) % 2) as f64;
        let end = i64::try_from(k + 1)? * 1000;
        for (desc, names) in &metrics {
            run.log_sample(desc, names, Sample::new(end, value))?;
        }
    }

    let summary = run.finish(true)?;
    let elapsed = start.elapsed();

    let total = per_metric * u64::from(metric_count);
    let ns_per_sample = elapsed.as_nanos() as f64 / total.max(1) as f64;
    let samples_per_sec = total as f64 / elapsed.as_secs_f64();

    info!(records = summary.records, "bench finished");

    println!();
    println!("Results:");
    println!("  Samples logged: {total}");
    println!("  Records written: {}", summary.records);
    println!("  Elapsed: {elapsed:.3?}");
    println!("  Avg latency: {ns_per_sample:.1} ns/sample");
    println!("  Throughput: {samples_per_sec:.0} samples/sec");
    println!();

    // Clean up
    let _ = std::fs::remove_dir_all(&temp_dir);

    Ok(())
}
