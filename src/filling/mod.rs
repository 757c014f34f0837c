//! Gap-Filling Engine
//!
//! ## Architecture
//!
//! ```text
//! Registry ──► Simulator ──► lookup::fill ────────┐
//!                  │                              ├──► FillOutcome (one per technique × scenario)
//!                  └───────► interpolation::fill ─┘
//!                                                     │
//!                             merged into TimeSeries ◄┘  ──► real-gap fill (`<T>_real`)
//! ```
//!
//! Every fill reads the observed channel and covariates only and returns an
//! independent [`FillOutcome`]; nothing is written into the series until the
//! simulator merges all outcomes. A fill that reaches its window ceiling
//! is not an error: its residual gaps stay missing and are reported on the
//! outcome.

pub mod interpolation;
pub mod lookup;
pub mod simulator;

use thiserror::Error;

use crate::config::FillingSettings;
use crate::series::{is_missing, SeriesError, TimeSeries};
use crate::techniques::{Technique, TechniqueKind};
use crate::types::Scenario;

pub use simulator::{fill_real_gaps, simulate, SimulationReport};

#[derive(Debug, Error)]
pub enum FillError {
    #[error(transparent)]
    Series(#[from] SeriesError),

    #[error("Default technique '{0}' has no half-hour scenario channel")]
    MissingDefault(String),
}

/// Result of filling one technique under one scenario.
#[derive(Debug, Clone)]
pub struct FillOutcome {
    pub technique: String,
    pub scenario: Scenario,
    /// One value per series row; `NaN` where the fill gave up.
    pub values: Vec<f64>,
    /// Completed passes over the remaining gaps.
    pub passes: usize,
    /// Day radius of the last pass.
    pub day_radius: u32,
    pub residual_gaps: usize,
    /// False when the window ceiling stopped the fill early.
    pub converged: bool,
}

impl FillOutcome {
    pub fn channel_name(&self) -> String {
        self.scenario.channel_name(&self.technique)
    }
}

/// Fill `technique` under `scenario`, dispatching on the technique kind.
pub fn fill_technique(
    series: &TimeSeries,
    observed: &str,
    technique: &Technique,
    scenario: Scenario,
    policy: &FillingSettings,
) -> Result<FillOutcome, FillError> {
    match &technique.kind {
        TechniqueKind::Lookup(spec) => {
            lookup::fill(series, observed, &technique.name, spec, scenario, policy)
        }
        TechniqueKind::Interpolation(method) => {
            interpolation::fill(series, observed, &technique.name, *method, scenario, policy)
        }
    }
}

fn count_missing(values: &[f64]) -> usize {
    values.iter().filter(|v| is_missing(**v)).count()
}

fn missing_rows(values: &[f64]) -> Vec<usize> {
    values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| is_missing(*v).then_some(i))
        .collect()
}
