//! Run description and gap distribution of the observed channel.

use serde::Serialize;
use tracing::error;

use super::{round_dec, AnalysisError};
use crate::bootstrap::{eligible_rows, filter_time_of_day, technique_channels};
use crate::config::defaults::HALF_HOURS_PER_DAY;
use crate::config::Settings;
use crate::series::csv::{format_value, Table};
use crate::series::{gaps, is_missing, TimeSeries};
use crate::types::{Scenario, TimeOfDay};

/// Rows a bootstrap of one scenario and time of day can draw from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EligibleCount {
    pub scenario: Scenario,
    pub time_of_day: TimeOfDay,
    /// `None` when the time-of-day split is not configured.
    pub points: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunDescription {
    pub gas: String,
    pub flux_column: String,
    pub num_days: f64,
    pub num_half_hours: usize,
    pub num_measurements: usize,
    pub num_gaps: usize,
    pub short_gap_points: usize,
    pub long_gap_points: usize,
    pub gap_percent: f64,
    pub eligible: Vec<EligibleCount>,
}

pub fn describe(series: &TimeSeries, settings: &Settings) -> Result<RunDescription, AnalysisError> {
    let observed = series.require(settings.observed_channel())?;
    let num_half_hours = series.len();
    let num_gaps = observed.iter().filter(|v| is_missing(**v)).count();
    let num_measurements = num_half_hours - num_gaps;
    let classes = gaps::classify(observed, settings.filling.short_gap_half_hours);

    if classes.total() != num_gaps {
        error!(
            gaps = num_gaps,
            short = classes.short_points,
            long = classes.long_points,
            "Gap classes do not add up to the number of gaps"
        );
    }

    let mut eligible = Vec::with_capacity(Scenario::ALL.len() * TimeOfDay::ALL.len());
    for scenario in Scenario::ALL {
        let names = technique_channels(series, scenario);
        let columns = names
            .iter()
            .map(|name| series.require(name))
            .collect::<Result<Vec<_>, _>>()?;
        for time_of_day in TimeOfDay::ALL {
            let points = filter_time_of_day(series, settings, time_of_day)
                .ok()
                .map(|obs| eligible_rows(&obs, &columns).into_iter().filter(|e| *e).count());
            eligible.push(EligibleCount {
                scenario,
                time_of_day,
                points,
            });
        }
    }

    Ok(RunDescription {
        gas: settings.flux.gas.clone(),
        flux_column: settings.flux.column.clone(),
        num_days: round_dec(num_half_hours as f64 / HALF_HOURS_PER_DAY as f64, 2),
        num_half_hours,
        num_measurements,
        num_gaps,
        short_gap_points: classes.short_points,
        long_gap_points: classes.long_points,
        gap_percent: if num_half_hours == 0 {
            0.0
        } else {
            round_dec(num_gaps as f64 / num_half_hours as f64 * 100.0, 1)
        },
        eligible,
    })
}

impl RunDescription {
    /// Eligible bootstrap points for one scenario and time of day.
    pub fn eligible_points(&self, scenario: Scenario, time_of_day: TimeOfDay) -> Option<usize> {
        self.eligible
            .iter()
            .find(|e| e.scenario == scenario && e.time_of_day == time_of_day)
            .and_then(|e| e.points)
    }

    /// Two-column `Property,Value` table.
    pub fn to_table(&self) -> Table {
        let mut table = Table::new(["Property", "Value"]);
        let mut row = |name: String, value: String| table.push_row(vec![name, value]);
        row("FluxGas".into(), self.gas.clone());
        row("FluxOrg".into(), self.flux_column.clone());
        row("NumDays".into(), format_value(self.num_days));
        row("NumHHs".into(), self.num_half_hours.to_string());
        row("NumMeas".into(), self.num_measurements.to_string());
        row("NumGaps".into(), self.num_gaps.to_string());
        row("NumGaps_short".into(), self.short_gap_points.to_string());
        row("NumGaps_long".into(), self.long_gap_points.to_string());
        row("PercGaps".into(), format_value(self.gap_percent));
        for e in &self.eligible {
            row(
                format!("NumBoot_{}_{}", e.scenario.suffix(), e.time_of_day.code()),
                e.points.map_or_else(|| "NA".to_string(), |p| p.to_string()),
            );
        }
        table
    }
}

/// Gap-length histogram of the observed channel as a table.
pub fn gap_distribution_table(
    series: &TimeSeries,
    settings: &Settings,
) -> Result<Table, AnalysisError> {
    let observed = series.require(settings.observed_channel())?;
    let mut table =
        Table::new(["GapLength", "Runs", "HalfHours", "CumGapPercent", "CumDataPercent"]);
    for row in gaps::gap_distribution(observed) {
        table.push_row(vec![
            row.length.to_string(),
            row.runs.to_string(),
            row.half_hours.to_string(),
            format_value(round_dec(row.cumulative_gap_percent, 2)),
            format_value(round_dec(row.cumulative_data_percent, 2)),
        ]);
    }
    Ok(table)
}
