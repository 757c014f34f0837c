//! Error estimates from bootstrap distributions.

use serde::Serialize;
use statrs::statistics::Statistics;

use super::{parse_cell, percentile, round_dec, AnalysisError};
use crate::bootstrap::BootstrapResult;
use crate::config::defaults::ERROR_DECIMALS;
use crate::series::csv::{format_value, Table};
use crate::types::{Statistic, TimeOfDay};

const COLUMNS: [&str; 7] = ["Technique", "Bias_10", "Bias_90", "SDev", "SDev_SD", "R2", "R2_SD"];

/// Accuracy of one technique channel (`<Technique>_<scenario>`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEstimate {
    pub channel: String,
    pub bias_10: f64,
    pub bias_90: f64,
    pub sdev: f64,
    pub sdev_sd: f64,
    pub r2: f64,
    pub r2_sd: f64,
}

impl ErrorEstimate {
    /// Largest absolute bias bound.
    pub fn max_abs_bias(&self) -> f64 {
        self.bias_10.abs().max(self.bias_90.abs())
    }
}

/// Estimates for every channel of both scenarios, half-hour channels first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorTable {
    pub time_of_day: TimeOfDay,
    pub estimates: Vec<ErrorEstimate>,
}

fn mean_and_sd(values: &[f64]) -> (f64, f64) {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    (finite.iter().mean(), finite.iter().population_std_dev())
}

fn estimate(result: &BootstrapResult, channel: &str) -> Option<ErrorEstimate> {
    let bias = result.distribution(Statistic::Bias, channel)?;
    let (sdev, sdev_sd) = mean_and_sd(&result.distribution(Statistic::SDev, channel)?);
    let (r2, r2_sd) = mean_and_sd(&result.distribution(Statistic::R2, channel)?);
    let r = |v: f64| round_dec(v, ERROR_DECIMALS);
    Some(ErrorEstimate {
        channel: channel.to_string(),
        bias_10: r(percentile(&bias, 10.0)),
        bias_90: r(percentile(&bias, 90.0)),
        sdev: r(sdev),
        sdev_sd: r(sdev_sd),
        r2: r(r2),
        r2_sd: r(r2_sd),
    })
}

/// Combine the half-hour and day bootstrap of one time of day.
pub fn estimate_errors(boot_hhs: &BootstrapResult, boot_days: &BootstrapResult) -> ErrorTable {
    let estimates = [boot_hhs, boot_days]
        .into_iter()
        .flat_map(|result| {
            result
                .techniques
                .iter()
                .filter_map(move |channel| estimate(result, channel))
        })
        .collect();
    ErrorTable {
        time_of_day: boot_hhs.time_of_day,
        estimates,
    }
}

impl ErrorTable {
    pub fn get(&self, channel: &str) -> Option<&ErrorEstimate> {
        self.estimates.iter().find(|e| e.channel == channel)
    }

    /// Like [`get`](Self::get) but a missing channel is an error.
    pub fn require(&self, channel: &str) -> Result<&ErrorEstimate, AnalysisError> {
        self.get(channel)
            .ok_or_else(|| AnalysisError::MissingEstimate(channel.to_string()))
    }

    pub fn to_table(&self) -> Table {
        let mut table = Table::new(COLUMNS);
        for e in &self.estimates {
            table.push_row(vec![
                e.channel.clone(),
                format_value(e.bias_10),
                format_value(e.bias_90),
                format_value(e.sdev),
                format_value(e.sdev_sd),
                format_value(e.r2),
                format_value(e.r2_sd),
            ]);
        }
        table
    }

    pub fn from_table(table: &Table, time_of_day: TimeOfDay) -> Result<Self, AnalysisError> {
        if table.header != COLUMNS {
            return Err(AnalysisError::Table(format!("expected columns {}", COLUMNS.join(","))));
        }
        let estimates = table
            .rows
            .iter()
            .map(|row| {
                let v = |i: usize| parse_cell(&row[i], COLUMNS[i]);
                Ok(ErrorEstimate {
                    channel: row[0].clone(),
                    bias_10: v(1)?,
                    bias_90: v(2)?,
                    sdev: v(3)?,
                    sdev_sd: v(4)?,
                    r2: v(5)?,
                    r2_sd: v(6)?,
                })
            })
            .collect::<Result<_, AnalysisError>>()?;
        Ok(Self { time_of_day, estimates })
    }
}

/// Presentation table over time-of-day filters: one row per channel and
/// filter with the bias interval and mean ± SD of SDev and R2.
pub fn combined_table(tables: &[&ErrorTable], gas: &str, unit: &str) -> Table {
    let fmt = |v: f64| format!("{v:.4}");
    let mut out = Table::new([
        format!("{gas} ({unit})"),
        "TimeBase".to_string(),
        "Bias".into(),
        "SDev".into(),
        "R2".into(),
    ]);
    let Some(first) = tables.first() else {
        return out;
    };
    for channel in first.estimates.iter().map(|e| &e.channel) {
        for table in tables {
            if let Some(e) = table.get(channel) {
                out.push_row(vec![
                    channel.clone(),
                    table.time_of_day.code().to_string(),
                    format!("({}, {})", fmt(e.bias_10), fmt(e.bias_90)),
                    format!("{} ±{}", fmt(e.sdev), fmt(e.sdev_sd)),
                    format!("{} ±{}", fmt(e.r2), fmt(e.r2_sd)),
                ]);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::bootstrap;
    use crate::types::Scenario;
    use crate::config::BootstrapSettings;
    use crate::series::TimeSeries;
    use chrono::NaiveDate;

    fn results() -> (BootstrapResult, BootstrapResult) {
        let n = 6 * 48;
        let obs: Vec<f64> = (0..n).map(|i| ((i % 48) as f64 - 24.0).abs()).collect();
        let offset: Vec<f64> = obs.iter().map(|o| o + 0.5).collect();
        let series = TimeSeries::whole_days(NaiveDate::from_ymd_opt(2020, 9, 1).unwrap(), 6)
            .unwrap()
            .with_channel("flux_obs", obs.clone())
            .unwrap()
            .with_channel("X_hhs", offset.clone())
            .unwrap()
            .with_channel("X_days", offset)
            .unwrap();
        let params = BootstrapSettings {
            repetitions: 30,
            sample_percent: 50.0,
            seed: 1,
        };
        (
            bootstrap(&series, "flux_obs", Scenario::HalfHour, &params, false).unwrap(),
            bootstrap(&series, "flux_obs", Scenario::Day, &params, false).unwrap(),
        )
    }

    #[test]
    fn constant_offset_gives_exact_estimates() {
        let (hhs, days) = results();
        let errors = estimate_errors(&hhs, &days);
        assert_eq!(errors.estimates.len(), 2);
        assert_eq!(errors.estimates[0].channel, "X_hhs");
        let e = errors.require("X_days").unwrap();
        assert_eq!(e.bias_10, 0.5);
        assert_eq!(e.bias_90, 0.5);
        assert_eq!(e.sdev, round_dec(0.5 * std::f64::consts::SQRT_2, 6));
        assert_eq!(e.sdev_sd, 0.0);
        assert_eq!(e.r2, 1.0);
        assert_eq!(e.max_abs_bias(), 0.5);
        assert!(matches!(errors.require("Y_hhs"), Err(AnalysisError::MissingEstimate(_))));
    }

    #[test]
    fn table_round_trip() {
        let (hhs, days) = results();
        let errors = estimate_errors(&hhs, &days);
        let back = ErrorTable::from_table(&errors.to_table(), TimeOfDay::FullTime).unwrap();
        assert_eq!(back, errors);

        let combined = combined_table(&[&errors, &back], "CO2", "umol m-2 s-1");
        assert_eq!(combined.rows.len(), 4);
        assert_eq!(combined.rows[0][2], "(0.5000, 0.5000)");
    }
}
