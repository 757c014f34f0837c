//! Artificial Gap Simulator and real-gap filling.
//!
//! Runs every registered technique under both scenarios (half-hour first,
//! then day; techniques in registry order), optionally on the rayon pool,
//! and merges the independent outcomes into the series in that same order.

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use super::{fill_technique, FillError, FillOutcome};
use crate::config::defaults::REAL_SUFFIX;
use crate::config::Settings;
use crate::series::{is_missing, TimeSeries};
use crate::techniques::{Registry, Technique};
use crate::types::Scenario;

/// Convergence summary of one (technique, scenario) fill.
#[derive(Debug, Clone, Serialize)]
pub struct FillSummary {
    pub channel: String,
    pub passes: usize,
    pub day_radius: u32,
    pub residual_gaps: usize,
    pub converged: bool,
}

impl From<&FillOutcome> for FillSummary {
    fn from(outcome: &FillOutcome) -> Self {
        Self {
            channel: outcome.channel_name(),
            passes: outcome.passes,
            day_radius: outcome.day_radius,
            residual_gaps: outcome.residual_gaps,
            converged: outcome.converged,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationReport {
    pub filled: Vec<FillSummary>,
    /// Channels already complete in the input and left untouched.
    pub skipped: Vec<String>,
}

impl SimulationReport {
    pub fn unconverged(&self) -> impl Iterator<Item = &FillSummary> {
        self.filled.iter().filter(|s| !s.converged)
    }
}

/// Fill every technique under every scenario and add the channels to `series`.
pub fn simulate(
    series: &mut TimeSeries,
    registry: &Registry,
    settings: &Settings,
) -> Result<SimulationReport, FillError> {
    let observed = settings.observed_channel();
    series.require(observed)?;

    let mut report = SimulationReport::default();
    let mut jobs: Vec<(&Technique, Scenario)> = Vec::new();
    for scenario in Scenario::ALL {
        for technique in registry {
            let channel = scenario.channel_name(&technique.name);
            if series.is_complete(&channel) {
                info!(channel = %channel, "Channel already filled, skipping");
                report.skipped.push(channel);
            } else {
                jobs.push((technique, scenario));
            }
        }
    }

    info!(
        jobs = jobs.len(),
        skipped = report.skipped.len(),
        parallel = settings.filling.parallel,
        "Starting artificial gap simulation"
    );

    let policy = &settings.filling;
    let base: &TimeSeries = series;
    let run = |(technique, scenario): &(&Technique, Scenario)| {
        info!(technique = %technique.name, scenario = %scenario, "Filling");
        fill_technique(base, observed, technique, *scenario, policy)
    };
    let outcomes: Vec<FillOutcome> = if settings.filling.parallel {
        jobs.par_iter().map(run).collect::<Result<_, _>>()?
    } else {
        jobs.iter().map(run).collect::<Result<_, _>>()?
    };

    for outcome in outcomes {
        let summary = FillSummary::from(&outcome);
        info!(
            channel = %summary.channel,
            passes = summary.passes,
            day_radius = summary.day_radius,
            residual = summary.residual_gaps,
            converged = summary.converged,
            "Fill finished"
        );
        series.insert_channel(summary.channel.clone(), outcome.values)?;
        report.filled.push(summary);
    }

    Ok(report)
}

/// Build `<T>_real` for every `<T>_hhs` channel: observed where measured,
/// else the technique's value, else the default technique's value.
///
/// Returns the names of the new channels.
pub fn fill_real_gaps(
    series: &mut TimeSeries,
    settings: &Settings,
) -> Result<Vec<String>, FillError> {
    let observed = series.require(settings.observed_channel())?.to_vec();
    let default_channel = Scenario::HalfHour.channel_name(&settings.flux.default_technique);
    let fallback = series
        .channel(&default_channel)
        .ok_or_else(|| FillError::MissingDefault(settings.flux.default_technique.clone()))?
        .to_vec();

    let techniques: Vec<String> = series
        .channel_names()
        .filter_map(|name| Scenario::HalfHour.technique_of(name))
        .map(str::to_string)
        .collect();

    let mut created = Vec::with_capacity(techniques.len());
    for technique in techniques {
        let predicted = series.require(&Scenario::HalfHour.channel_name(&technique))?;
        let mut patched = 0usize;
        let values: Vec<f64> = observed
            .iter()
            .zip(predicted)
            .zip(&fallback)
            .map(|((&obs, &own), &default)| {
                if !is_missing(obs) {
                    obs
                } else if !is_missing(own) {
                    own
                } else {
                    patched += 1;
                    default
                }
            })
            .collect();

        if patched > 0 {
            warn!(
                technique = %technique,
                patched,
                default = %settings.flux.default_technique,
                "Residual real gaps patched with default technique"
            );
        }
        let name = format!("{technique}_{REAL_SUFFIX}");
        series.insert_channel(name.clone(), values)?;
        created.push(name);
    }

    info!(channels = created.len(), "Real gaps filled");
    Ok(created)
}
