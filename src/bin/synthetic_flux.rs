//! Synthetic Flux Generator
//!
//! Writes a deterministic half-hourly flux table with `Rg`, `Tair` and `VPD`
//! covariates and random gaps, plus a matching `multigap.toml`, as demo
//! input for the `multigap` CLI.
//!
//! # Usage
//! ```bash
//! ./synthetic-flux --days 60 --seed 7 --out data
//! multigap --data-dir data --config data/multigap.toml run
//! ```

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;

use multigap::series::csv::write_series;
use multigap::series::is_missing;
use multigap::synthetic::SyntheticFlux;
use multigap::Settings;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "synthetic-flux")]
#[command(about = "Synthetic half-hourly flux data for multigap")]
#[command(version)]
struct Args {
    /// Number of whole days
    #[arg(
        short,
        long,
        default_value = "60",
        value_parser = clap::value_parser!(u32).range(1..=3660)
    )]
    days: u32,

    /// Random seed for reproducibility
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Share of missing flux half-hours (0-0.9)
    #[arg(long, default_value = "0.25")]
    gap_fraction: f64,

    /// Standard deviation of the flux noise
    #[arg(long, default_value = "1.0")]
    noise_sd: f64,

    /// First day (YYYY-MM-DD)
    #[arg(long, default_value = "2021-06-01")]
    start: NaiveDate,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    out: PathBuf,

    /// Data file name inside the output directory
    #[arg(long, default_value = "fluxes.csv")]
    file: String,

    /// Bootstrap repetitions written into the settings
    #[arg(long, default_value = "999")]
    repetitions: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let series = SyntheticFlux::new(args.days as usize)
        .seed(args.seed)
        .gap_fraction(args.gap_fraction)
        .noise_sd(args.noise_sd)
        .first_day(args.start)
        .build()
        .context("Failed to build synthetic series")?;

    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("Failed to create {}", args.out.display()))?;

    let mut settings = Settings::default();
    settings.input.data_file = args.file.clone();
    settings.bootstrap.repetitions = args.repetitions;
    settings.bootstrap.seed = args.seed;

    let data_path = args.out.join(&args.file);
    write_series(&series, &data_path, settings.separator())
        .with_context(|| format!("Failed to write {}", data_path.display()))?;

    let settings_path = args.out.join("multigap.toml");
    settings
        .save_to_file(&settings_path)
        .with_context(|| format!("Failed to write {}", settings_path.display()))?;

    let missing = series
        .channel(&settings.flux.column)
        .map_or(0, |v| v.iter().filter(|x| is_missing(**x)).count());
    eprintln!(
        "{} days ({} half-hours, {} missing) → {}",
        series.num_days(),
        series.len(),
        missing,
        data_path.display()
    );
    eprintln!("settings → {}", settings_path.display());
    Ok(())
}
