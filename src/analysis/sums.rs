//! Period sums with propagated uncertainty.
//!
//! For every technique present under both scenarios:
//!
//! ```text
//! SumObs      = Σ observed × factor
//! SumFillReal = Σ <T>_real × factor − SumObs
//! RandomAll   = √(N · SDev_hhs²) × factor
//! BiasGaps    = (n_short · |bias|_hhs + n_long · |bias|_days) × factor
//! CI          = SumTotal ± (RandomAll + BiasGaps)
//! ```
//!
//! `|bias|` is the larger absolute value of the 10th/90th bias percentiles;
//! `n_short`/`n_long` count real-gap half-hours by the length of their run.

use serde::Serialize;

use super::errors::ErrorTable;
use super::{parse_cell, round_dec, AnalysisError};
use crate::config::defaults::{REAL_SUFFIX, SUM_DECIMALS};
use crate::config::Settings;
use crate::series::csv::{format_value, Table};
use crate::series::{gaps, is_missing, TimeSeries};
use crate::types::Scenario;

const COLUMNS: [&str; 9] = [
    "SumObs",
    "SumFillReal",
    "SumTotal",
    "MissFillReal",
    "RandomAll",
    "BiasGaps",
    "ErrorTotal",
    "LowerCI",
    "UpperCI",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodSum {
    pub technique: String,
    pub sum_obs: f64,
    pub sum_fill_real: f64,
    pub sum_total: f64,
    /// Real gaps the half-hour channel could not fill.
    pub miss_fill_real: usize,
    pub random_all: f64,
    pub bias_gaps: f64,
    pub error_total: f64,
    pub lower_ci: f64,
    pub upper_ci: f64,
}

/// Techniques with both a `_hhs` and a `_days` channel, in day-channel order.
pub fn techniques_in_both(series: &TimeSeries) -> Vec<String> {
    let names: Vec<&str> = series.channel_names().collect();
    names
        .iter()
        .filter_map(|name| Scenario::Day.technique_of(name))
        .filter(|t| names.contains(&Scenario::HalfHour.channel_name(t).as_str()))
        .map(str::to_string)
        .collect()
}

fn nan_sum(values: &[f64]) -> f64 {
    values.iter().filter(|v| !is_missing(**v)).sum()
}

/// Period sums of every technique, using the full-time error estimates.
pub fn sum_period(
    series: &TimeSeries,
    settings: &Settings,
    errors: &ErrorTable,
) -> Result<Vec<PeriodSum>, AnalysisError> {
    let observed = series.require(settings.observed_channel())?;
    let factor = settings.flux.conversion_factor;
    let r = |v: f64| round_dec(v, SUM_DECIMALS);

    let classes = gaps::classify(observed, settings.filling.short_gap_half_hours);
    let rows = series.len() as f64;
    let sum_obs = r(nan_sum(observed) * factor);

    techniques_in_both(series)
        .into_iter()
        .map(|technique| {
            let real_name = format!("{technique}_{REAL_SUFFIX}");
            let real = series
                .channel(&real_name)
                .ok_or_else(|| AnalysisError::MissingRealChannel(real_name.clone()))?;
            let hhs = series.require(&Scenario::HalfHour.channel_name(&technique))?;
            let err_hhs = errors.require(&Scenario::HalfHour.channel_name(&technique))?;
            let err_days = errors.require(&Scenario::Day.channel_name(&technique))?;

            let sum_fill_real = r(nan_sum(real) * factor - sum_obs);
            let sum_total = r(sum_obs + sum_fill_real);
            let miss_fill_real = observed
                .iter()
                .zip(hhs)
                .filter(|(o, p)| is_missing(**o) && is_missing(**p))
                .count();

            let random_all = r((rows * err_hhs.sdev.powi(2)).sqrt() * factor);
            let bias_gaps = r((classes.short_points as f64 * err_hhs.max_abs_bias()
                + classes.long_points as f64 * err_days.max_abs_bias())
                * factor);
            let error_total = r(random_all + bias_gaps);

            Ok(PeriodSum {
                technique,
                sum_obs,
                sum_fill_real,
                sum_total,
                miss_fill_real,
                random_all,
                bias_gaps,
                error_total,
                lower_ci: r(sum_total - error_total),
                upper_ci: r(sum_total + error_total),
            })
        })
        .collect()
}

/// Sum table with the gas and sum unit in the index header.
pub fn to_table(sums: &[PeriodSum], gas: &str, sum_unit: &str) -> Table {
    let header = std::iter::once(format!("{gas} ({sum_unit})"))
        .chain(COLUMNS.iter().map(|c| c.to_string()));
    let mut table = Table::new(header);
    for s in sums {
        table.push_row(vec![
            s.technique.clone(),
            format_value(s.sum_obs),
            format_value(s.sum_fill_real),
            format_value(s.sum_total),
            s.miss_fill_real.to_string(),
            format_value(s.random_all),
            format_value(s.bias_gaps),
            format_value(s.error_total),
            format_value(s.lower_ci),
            format_value(s.upper_ci),
        ]);
    }
    table
}

pub fn from_table(table: &Table) -> Result<Vec<PeriodSum>, AnalysisError> {
    if table.header.len() != COLUMNS.len() + 1 || table.header[1..] != COLUMNS {
        return Err(AnalysisError::Table(format!("expected sum columns {}", COLUMNS.join(","))));
    }
    table
        .rows
        .iter()
        .map(|row| {
            let v = |i: usize| parse_cell(&row[i], COLUMNS[i - 1]);
            Ok(PeriodSum {
                technique: row[0].clone(),
                sum_obs: v(1)?,
                sum_fill_real: v(2)?,
                sum_total: v(3)?,
                miss_fill_real: row[4]
                    .trim()
                    .parse()
                    .map_err(|_| {
                        AnalysisError::Table(format!("MissFillReal: cannot parse '{}'", row[4]))
                    })?,
                random_all: v(5)?,
                bias_gaps: v(6)?,
                error_total: v(7)?,
                lower_ci: v(8)?,
                upper_ci: v(9)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::errors::ErrorEstimate;
    use crate::types::TimeOfDay;
    use chrono::NaiveDate;

    fn estimate(channel: &str, bias: (f64, f64), sdev: f64) -> ErrorEstimate {
        ErrorEstimate {
            channel: channel.to_string(),
            bias_10: bias.0,
            bias_90: bias.1,
            sdev,
            sdev_sd: 0.0,
            r2: 1.0,
            r2_sd: 0.0,
        }
    }

    fn errors() -> ErrorTable {
        ErrorTable {
            time_of_day: TimeOfDay::FullTime,
            estimates: vec![
                estimate("T_hhs", (-0.2, 0.1), 1.0),
                estimate("T_days", (-0.5, 0.8), 2.0),
            ],
        }
    }

    #[test]
    fn sums_split_gaps_by_run_length() {
        let mut obs = vec![1.0; 48];
        obs[0] = f64::NAN;
        obs[10..30].fill(f64::NAN);
        let mut real = obs.clone();
        for v in real.iter_mut().filter(|v| v.is_nan()) {
            *v = 2.0;
        }
        let mut hhs = vec![2.0; 48];
        hhs[0] = f64::NAN;
        let series = TimeSeries::whole_days(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(), 1)
            .unwrap()
            .with_channel("flux_obs", obs)
            .unwrap()
            .with_channel("T_hhs", hhs)
            .unwrap()
            .with_channel("T_days", vec![2.0; 48])
            .unwrap()
            .with_channel("T_real", real)
            .unwrap();

        let mut settings = Settings::default();
        settings.flux.conversion_factor = 1.0;
        let sums = sum_period(&series, &settings, &errors()).unwrap();
        assert_eq!(sums.len(), 1);
        let s = &sums[0];
        assert_eq!(s.sum_obs, 27.0);
        assert_eq!(s.sum_fill_real, 42.0);
        assert_eq!(s.sum_total, 69.0);
        assert_eq!(s.miss_fill_real, 1);
        assert_eq!(s.random_all, round_dec(48f64.sqrt(), 4));
        // one short gap point at |0.2|, twenty long gap points at |0.8|
        assert_eq!(s.bias_gaps, 16.2);
        assert_eq!(s.error_total, round_dec(s.random_all + 16.2, 4));
        assert!(s.lower_ci < s.sum_total && s.sum_total < s.upper_ci);

        let back = from_table(&to_table(&sums, "CO2", "gC m-2")).unwrap();
        assert_eq!(back, sums);
    }

    #[test]
    fn missing_real_channel_is_reported() {
        let series = TimeSeries::whole_days(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(), 1)
            .unwrap()
            .with_channel("flux_obs", vec![1.0; 48])
            .unwrap()
            .with_channel("T_hhs", vec![1.0; 48])
            .unwrap()
            .with_channel("T_days", vec![1.0; 48])
            .unwrap();
        assert!(matches!(
            sum_period(&series, &Settings::default(), &errors()),
            Err(AnalysisError::MissingRealChannel(name)) if name == "T_real"
        ));
    }
}
