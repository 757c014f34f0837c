//! multigap - Multiple Gap-Filling CLI
//!
//! Runs the staged gap-filling workflow on a half-hourly flux table.
//!
//! # Usage
//!
//! ```bash
//! # Complete run on ./data/fluxes.csv with ./data/multigap.toml
//! multigap --data-dir data --config data/multigap.toml run
//!
//! # Individual stages of an existing run
//! multigap --data-dir data fill
//! multigap --data-dir data inspect --run 202208121237
//! multigap --data-dir data bootstrap --run 202208121237
//! multigap --data-dir data analyse --run 202208121237
//! multigap --data-dir data ensemble --run 202208121237 --pattern "IP|MDC"
//! ```
//!
//! # Environment Variables
//!
//! - `MULTIGAP_CONFIG`: settings file used when `--config` is not given
//! - `RUST_LOG`: logging level (default: info)

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::fmt::format::{DefaultFields, Format};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

use multigap::config::validation::validate_unknown_keys;
use multigap::pipeline::{new_run_number, Pipeline, RunDir, RunSummary};
use multigap::{EnsembleResult, Settings};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "multigap")]
#[command(about = "Multiple gap-filling of half-hourly flux series with bootstrapped uncertainty")]
#[command(version)]
struct CliArgs {
    /// Directory holding the input tables and the run directories
    #[arg(long, default_value = ".", env = "MULTIGAP_DATA_DIR")]
    data_dir: PathBuf,

    /// Settings file for a new run (default: $MULTIGAP_CONFIG, ./multigap.toml, built-ins)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log as JSON lines on stderr
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// New run through every stage
    Run {
        /// Ensemble inclusion pattern (regex on technique names)
        #[arg(long)]
        pattern: Option<String>,

        /// Print the run summary as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Fill artificial gaps (new run unless --run is given)
    Fill {
        #[arg(long)]
        run: Option<String>,
    },

    /// Fill real gaps and describe the run
    Inspect {
        #[arg(long)]
        run: String,
    },

    /// Bootstrap technique accuracy
    Bootstrap {
        #[arg(long)]
        run: String,
    },

    /// Error tables and period sums
    Analyse {
        #[arg(long)]
        run: String,
    },

    /// Ensemble of selected techniques
    Ensemble {
        #[arg(long)]
        run: String,

        #[arg(long)]
        pattern: Option<String>,
    },

    /// Validate a settings file and print the resolved settings
    CheckConfig {
        path: PathBuf,
    },
}

// ============================================================================
// Logging
// ============================================================================

type FileLayer = fmt::Layer<Registry, DefaultFields, Format, Mutex<File>>;

/// Slot for the run's log file, filled once the run directory exists.
type LogFile = reload::Handle<Option<FileLayer>, Registry>;

/// Stderr logging; the run's log file is attached later.
fn init_logging(json: bool) -> LogFile {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (file_layer, handle) = reload::Layer::new(None::<FileLayer>);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(filter)
        .with((!json).then(|| fmt::layer().with_target(false).with_writer(std::io::stderr)))
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .init();
    handle
}

/// Tee all further output, without ANSI codes, into `path`.
fn attach_log_file(log: &LogFile, path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;
    let layer = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(Mutex::new(file));
    log.reload(Some(layer)).context("Failed to attach log file")?;
    Ok(())
}

// ============================================================================
// Run Setup
// ============================================================================

fn new_run_settings(config: Option<&Path>) -> Result<Settings> {
    match config {
        Some(path) => Settings::load_from_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        None => Ok(Settings::load()),
    }
}

/// Check the inputs, create the run directory and start logging into it.
fn start_run(args: &CliArgs, log: &LogFile) -> Result<Pipeline> {
    let run = RunDir::new(&args.data_dir, &new_run_number());
    let settings = new_run_settings(args.config.as_deref())?;
    info!(run = %run.run_number(), root = %run.root().display(), "New run");
    let pipeline = Pipeline::start(run, settings).context("Failed to start run")?;
    attach_log_file(log, &pipeline.run_dir().log_file())?;
    Ok(pipeline)
}

fn resume_run(args: &CliArgs, log: &LogFile, run_number: &str) -> Result<Pipeline> {
    let run = RunDir::open(&args.data_dir, run_number)?;
    attach_log_file(log, &run.log_file())?;
    Pipeline::resume(run).context("Failed to resume run")
}

// ============================================================================
// Output
// ============================================================================

fn print_ensemble(result: &EnsembleResult, settings: &Settings) {
    println!();
    println!("  Ensemble ({} in {})", settings.flux.gas, settings.flux.sum_unit);
    println!("  ─────────────────────────────");
    for (name, value) in result.rows() {
        println!("  {name:<10} {value:>12.1}");
    }
    println!();
}

fn print_summary(summary: &RunSummary, settings: &Settings, json: bool) -> Result<()> {
    if json {
        let text = serde_json::to_string_pretty(summary).context("Failed to serialize summary")?;
        println!("{text}");
        return Ok(());
    }
    println!();
    println!("  Run {}", summary.run_number);
    println!(
        "  {} days, {:.1}% gaps ({} short / {} long half-hours)",
        summary.description.num_days,
        summary.description.gap_percent,
        summary.description.short_gap_points,
        summary.description.long_gap_points
    );
    println!();
    println!("  {:<16} {:>12} {:>12} {:>8}", "Technique", "SumTotal", "ErrorTotal", "Missing");
    for s in &summary.sums {
        println!(
            "  {:<16} {:>12.4} {:>12.4} {:>8}",
            s.technique, s.sum_total, s.error_total, s.miss_fill_real
        );
    }
    print_ensemble(&summary.ensemble, settings);
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> Result<()> {
    let args = CliArgs::parse();
    let log = init_logging(args.log_json);

    match &args.command {
        Command::Run { pattern, json } => {
            let pipeline = start_run(&args, &log)?;
            let summary = pipeline.run_all(pattern.as_deref())?;
            print_summary(&summary, pipeline.settings(), *json)?;
        }
        Command::Fill { run } => {
            let pipeline = match run {
                Some(run) => resume_run(&args, &log, run)?,
                None => start_run(&args, &log)?,
            };
            let report = pipeline.fill()?;
            println!(
                "Run {}: {} channels filled, {} skipped, {} with residual gaps",
                pipeline.run_dir().run_number(),
                report.filled.len(),
                report.skipped.len(),
                report.unconverged().count()
            );
        }
        Command::Inspect { run } => {
            let description = resume_run(&args, &log, run)?.inspect()?;
            for row in description.to_table().rows {
                println!("  {:<20} {}", row[0], row[1]);
            }
        }
        Command::Bootstrap { run } => {
            let results = resume_run(&args, &log, run)?.bootstrap()?;
            println!("{} bootstrap tables written", results.len());
        }
        Command::Analyse { run } => {
            let sums = resume_run(&args, &log, run)?.analyse()?;
            println!("Period sums of {} techniques written", sums.len());
        }
        Command::Ensemble { run, pattern } => {
            let pipeline = resume_run(&args, &log, run)?;
            let result = pipeline.ensemble(pattern.as_deref())?;
            print_ensemble(&result, pipeline.settings());
        }
        Command::CheckConfig { path } => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let unknown = validate_unknown_keys(&contents);
            for w in &unknown {
                println!("  warning: {w}");
            }
            let settings = Settings::from_toml_str(&contents)
                .with_context(|| format!("Invalid settings in {}", path.display()))?;
            println!("{}", settings.to_toml()?);
            println!("Settings valid ({} unknown keys)", unknown.len());
        }
    }
    Ok(())
}
