//! Look-up-table and diurnal-composite filling.
//!
//! Every row starts missing. Each pass visits the rows still missing, builds
//! the technique's window around them (excluding the artificial gap of the
//! scenario) and averages the measured values of all matching candidates.
//! A value needs at least `min_lut_matches` measured candidates. After each
//! pass the day radius grows by the technique's step; once it exceeds
//! `lut_ceiling_fraction` of all days the fill stops with residual gaps.

use tracing::{debug, info, warn};

use super::{count_missing, missing_rows, FillError, FillOutcome};
use crate::config::FillingSettings;
use crate::series::{is_missing, TimeSeries};
use crate::techniques::predicate::BoundPredicate;
use crate::techniques::{LookupSpec, MDS_TECHNIQUE};
use crate::types::Scenario;
use crate::window::{window_rows, Exclusion, HalfHourSpan};

pub fn fill(
    series: &TimeSeries,
    observed: &str,
    name: &str,
    spec: &LookupSpec,
    scenario: Scenario,
    policy: &FillingSettings,
) -> Result<FillOutcome, FillError> {
    let obs = series.require(observed)?;
    let predicate = spec.predicate.bind(series)?;
    let exclusion = Exclusion::from(scenario);
    let ceiling = policy.lut_ceiling_fraction * series.num_days() as f64;
    let total = series.len();

    let mut values = vec![f64::NAN; total];
    let mut radius = spec.start_days;
    let mut last_radius = radius;
    let mut passes = 0usize;
    let mut converged = true;

    loop {
        let pending = missing_rows(&values);
        if pending.is_empty() {
            break;
        }
        passes += 1;
        last_radius = radius;

        for row in pending {
            let mean = window_mean(
                series,
                obs,
                &predicate,
                row,
                radius,
                spec.span,
                exclusion,
                policy.min_lut_matches,
            );
            if let Some(mean) = mean {
                values[row] = mean;
            }
        }

        let remaining = count_missing(&values);
        debug!(
            technique = name,
            scenario = %scenario,
            pass = passes,
            radius,
            remaining,
            "LUT pass finished"
        );
        if name == MDS_TECHNIQUE {
            info!(
                window = radius,
                remaining,
                total,
                percent = %format!("{:.2}", remaining as f64 / total as f64 * 100.0),
                "LUT_MDS remaining gaps"
            );
        }

        radius = radius.saturating_add(spec.step_days.max(1));
        if remaining > 0 && f64::from(radius) > ceiling {
            warn!(
                technique = name,
                scenario = %scenario,
                remaining,
                radius,
                ceiling,
                "Window ceiling reached, leaving residual gaps"
            );
            converged = false;
            break;
        }
    }

    let residual_gaps = count_missing(&values);
    Ok(FillOutcome {
        technique: name.to_string(),
        scenario,
        values,
        passes,
        day_radius: last_radius,
        residual_gaps,
        converged,
    })
}

/// Mean of measured, matching candidates; `None` below `min_matches`.
#[allow(clippy::too_many_arguments)]
fn window_mean(
    series: &TimeSeries,
    obs: &[f64],
    predicate: &BoundPredicate<'_>,
    row: usize,
    radius: u32,
    span: HalfHourSpan,
    exclusion: Exclusion,
    min_matches: usize,
) -> Option<f64> {
    let (sum, count) = window_rows(series, row, radius, span, exclusion)
        .into_iter()
        .filter(|&c| !is_missing(obs[c]) && predicate.matches(c, row))
        .fold((0.0, 0usize), |(sum, count), c| (sum + obs[c], count + 1));
    (count >= min_matches.max(1)).then(|| sum / count as f64)
}
