//! Error/Sum Aggregation and Ensemble Selection
//!
//! Turns bootstrap distributions into per-technique error estimates, period
//! sums with confidence intervals and the ensemble envelope. Everything here
//! is a pure function of its inputs; the series is only read.
//!
//! ## Modules
//!
//! - `errors`: percentile bias bounds, mean ± SD of SDev and R2
//! - `sums`: observed + filled sums, random and bias uncertainty
//! - `ensemble`: technique selection and min/max envelope
//! - `describe`: run description and gap distribution

pub mod describe;
pub mod ensemble;
pub mod errors;
pub mod sums;

use thiserror::Error;

use crate::series::SeriesError;

pub use describe::{describe, RunDescription};
pub use ensemble::{ensemble, select_techniques, EnsembleResult};
pub use errors::{estimate_errors, ErrorEstimate, ErrorTable};
pub use sums::{sum_period, PeriodSum};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Series(#[from] SeriesError),

    #[error("No error estimate for '{0}'")]
    MissingEstimate(String),

    #[error("Channel '{0}' missing, fill real gaps first")]
    MissingRealChannel(String),

    #[error("Ensemble selection is empty (pattern '{0}')")]
    EmptyEnsemble(String),

    #[error("Invalid ensemble pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("Malformed table: {0}")]
    Table(String),
}

/// Round to `digits` decimals, ties to even.
pub fn round_dec(value: f64, digits: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let scale = 10f64.powi(i32::try_from(digits).unwrap_or(i32::MAX));
    (value * scale).round_ties_even() / scale
}

/// Percentile with linear interpolation between closest ranks, over finite values.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return f64::NAN;
    }
    sorted.sort_by(f64::total_cmp);
    let rank = q.clamp(0.0, 100.0) / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

fn parse_cell(cell: &str, column: &str) -> Result<f64, AnalysisError> {
    crate::series::csv::parse_value(cell)
        .ok_or_else(|| AnalysisError::Table(format!("column '{column}': cannot parse '{cell}'")))
}
