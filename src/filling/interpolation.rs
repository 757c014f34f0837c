//! Interpolation techniques (`IP_lin`, `IP_mov`).
//!
//! Each missing row is filled from a contiguous window of whole days around
//! it (± `win_days`), in which the scenario's artificial gap is masked. The
//! length of the gap run holding the row, as seen inside that window, picks
//! the branch:
//!
//! - **short** (≤ `short_gap_half_hours`): time-linear interpolation between
//!   the nearest measured neighbours, or a centered rolling mean that widens
//!   from `rolling_start_window` half-hours in steps of `rolling_window_step`
//!   until it yields a value
//! - **long**: daily means of the window, either linearly interpolated across
//!   missing days (at most `win_days` days from a measured day) or smoothed
//!   with a centered rolling mean of `rolling_min_days + win_days` days
//!
//! Passes widen `win_days` from `interpolation_start_day_radius` until
//! everything is filled or the radius passes `interpolation_max_day_radius`.

use tracing::{debug, warn};

use super::{count_missing, missing_rows, FillError, FillOutcome};
use crate::config::FillingSettings;
use crate::series::{gaps, is_missing, TimeSeries};
use crate::techniques::Interpolation;
use crate::types::Scenario;
use crate::window::{window_rows, Exclusion, HalfHourSpan};

pub fn fill(
    series: &TimeSeries,
    observed: &str,
    name: &str,
    method: Interpolation,
    scenario: Scenario,
    policy: &FillingSettings,
) -> Result<FillOutcome, FillError> {
    let obs = series.require(observed)?;
    let mut values = vec![f64::NAN; series.len()];
    let mut win_days = policy.interpolation_start_day_radius;
    let mut last_radius = win_days;
    let mut passes = 0usize;
    let mut converged = true;

    loop {
        let pending = missing_rows(&values);
        if pending.is_empty() {
            break;
        }
        passes += 1;
        last_radius = win_days;

        for row in pending {
            let local = LocalWindow::new(series, obs, row, win_days, scenario);
            let short = local.gap_run_length() <= policy.short_gap_half_hours;
            values[row] = match (method, short) {
                (Interpolation::TimeLinear, true) => local.time_linear(),
                (Interpolation::TimeLinear, false) => local.daily_linear(win_days as usize),
                (Interpolation::MovingAverage, true) => local.rolling_mean(policy),
                (Interpolation::MovingAverage, false) => {
                    local.daily_rolling(win_days as usize, policy)
                }
            };
        }

        let remaining = count_missing(&values);
        debug!(
            technique = name,
            scenario = %scenario,
            pass = passes,
            win_days,
            remaining,
            "Interpolation pass finished"
        );

        win_days += 1;
        if remaining > 0 && win_days > policy.interpolation_max_day_radius {
            warn!(
                technique = name,
                scenario = %scenario,
                remaining,
                win_days,
                "Interpolation window ceiling reached, leaving residual gaps"
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

// ============================================================================
// Local Window
// ============================================================================

/// Contiguous rows around one target with the scenario's gap masked.
struct LocalWindow<'a> {
    series: &'a TimeSeries,
    rows: Vec<usize>,
    data: Vec<f64>,
    target: usize,
}

impl<'a> LocalWindow<'a> {
    fn new(
        series: &'a TimeSeries,
        obs: &[f64],
        row: usize,
        win_days: u32,
        scenario: Scenario,
    ) -> Self {
        let rows = window_rows(series, row, win_days, HalfHourSpan::FullDay, Exclusion::None);
        let target = rows.iter().position(|&r| r == row).unwrap_or(0);
        let day = series.day_index(row);
        let data = rows
            .iter()
            .map(|&r| {
                let masked = match scenario {
                    Scenario::HalfHour => r == row,
                    Scenario::Day => series.day_index(r) == day,
                };
                if masked { f64::NAN } else { obs[r] }
            })
            .collect();
        Self {
            series,
            rows,
            data,
            target,
        }
    }

    fn gap_run_length(&self) -> usize {
        if !is_missing(self.data[self.target]) {
            return 0;
        }
        let before = self.data[..self.target]
            .iter()
            .rev()
            .take_while(|v| is_missing(**v))
            .count();
        let after = self.data[self.target + 1..]
            .iter()
            .take_while(|v| is_missing(**v))
            .count();
        before + 1 + after
    }

    /// Calendar-time linear interpolation; edges take the nearest measured value.
    fn time_linear(&self) -> f64 {
        let left = (0..self.target).rev().find(|&i| !is_missing(self.data[i]));
        let right = (self.target + 1..self.data.len()).find(|&i| !is_missing(self.data[i]));
        match (left, right) {
            (Some(l), Some(r)) => {
                let stamp = |i: usize| self.series.timestamp(self.rows[i]);
                let span = (stamp(r) - stamp(l)).num_seconds() as f64;
                let offset = (stamp(self.target) - stamp(l)).num_seconds() as f64;
                self.data[l] + (self.data[r] - self.data[l]) * offset / span
            }
            (Some(i), None) | (None, Some(i)) => self.data[i],
            (None, None) => f64::NAN,
        }
    }

    /// Widening centered rolling mean.
    fn rolling_mean(&self, policy: &FillingSettings) -> f64 {
        let widest = 2 * self.data.len() + 1;
        let mut window = policy.rolling_start_window;
        loop {
            let value = centered_mean(&self.data, self.target, window, policy.rolling_min_points);
            if !is_missing(value) || window > widest {
                return value;
            }
            window += policy.rolling_window_step.max(1);
        }
    }

    /// Mean per calendar day of the window and the target's day position.
    fn daily_means(&self) -> (Vec<f64>, usize) {
        let first_day = self.series.day_index(self.rows[0]);
        let target_day = self.series.day_index(self.rows[self.target]) - first_day;
        let days = self.series.day_index(self.rows[self.rows.len() - 1]) - first_day + 1;

        let mut sums = vec![(0.0, 0usize); days];
        for (pos, &r) in self.rows.iter().enumerate() {
            let v = self.data[pos];
            if !is_missing(v) {
                let slot = &mut sums[self.series.day_index(r) - first_day];
                slot.0 += v;
                slot.1 += 1;
            }
        }
        let means = sums
            .into_iter()
            .map(|(sum, count)| if count == 0 { f64::NAN } else { sum / count as f64 })
            .collect();
        (means, target_day)
    }

    fn daily_linear(&self, limit: usize) -> f64 {
        let (means, day) = self.daily_means();
        interpolate_limited(&means, limit)[day]
    }

    fn daily_rolling(&self, win_days: usize, policy: &FillingSettings) -> f64 {
        let (means, day) = self.daily_means();
        let window = policy.rolling_min_days + win_days;
        centered_mean(&means, day, window, policy.rolling_min_days)
    }
}

// ============================================================================
// Numeric Helpers
// ============================================================================

/// Mean of a centered window (`(window - 1) / 2` points ahead), clipped to the slice.
fn centered_mean(values: &[f64], pos: usize, window: usize, min_points: usize) -> f64 {
    if values.is_empty() || window == 0 {
        return f64::NAN;
    }
    let offset = (window - 1) / 2;
    let end = (pos + offset).min(values.len() - 1);
    let start = (pos + offset + 1).saturating_sub(window);
    let (sum, count) = values[start..=end]
        .iter()
        .filter(|v| !is_missing(**v))
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count >= min_points.max(1) {
        sum / count as f64
    } else {
        f64::NAN
    }
}

/// Linear interpolation over missing entries reachable within `limit` steps
/// of a measured entry; leading and trailing gaps take the nearest value.
fn interpolate_limited(values: &[f64], limit: usize) -> Vec<f64> {
    let mut out = values.to_vec();
    for run in gaps::gap_runs(values) {
        let left = run.start.checked_sub(1);
        let right = (run.end() < values.len()).then_some(run.end());
        for i in run.start..run.end() {
            let near_left = left.is_some_and(|l| i - l <= limit);
            let near_right = right.is_some_and(|r| r - i <= limit);
            if !(near_left || near_right) {
                continue;
            }
            out[i] = match (left, right) {
                (Some(l), Some(r)) => {
                    values[l] + (values[r] - values[l]) * (i - l) as f64 / (r - l) as f64
                }
                (Some(k), None) | (None, Some(k)) => values[k],
                (None, None) => f64::NAN,
            };
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const N: f64 = f64::NAN;

    fn series(obs: Vec<f64>) -> TimeSeries {
        let days = obs.len() / 48;
        TimeSeries::whole_days(NaiveDate::from_ymd_opt(2021, 4, 1).unwrap(), days)
            .unwrap()
            .with_channel("flux_obs", obs)
            .unwrap()
    }

    #[test]
    fn centered_mean_matches_rolling_convention() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(centered_mean(&v, 2, 3, 1), 3.0);
        // Even windows reach one further back than ahead
        assert_eq!(centered_mean(&v, 2, 4, 1), 2.5);
        assert_eq!(centered_mean(&v, 0, 5, 2), 2.0);
        assert!(centered_mean(&[N, 1.0, N], 1, 3, 2).is_nan());
    }

    #[test]
    fn interpolation_respects_limit() {
        let v = [1.0, N, N, N, N, 6.0];
        let out = interpolate_limited(&v, 1);
        assert_eq!(out[1], 2.0);
        assert!(out[2].is_nan() && out[3].is_nan());
        assert_eq!(out[4], 5.0);

        let edges = interpolate_limited(&[N, N, 3.0, N], 1);
        assert!(edges[0].is_nan());
        assert_eq!(edges[1], 3.0);
        assert_eq!(edges[3], 3.0);
    }

    #[test]
    fn linear_ramp_is_exact_for_short_gaps() {
        let mut obs: Vec<f64> = (0..3 * 48).map(f64::from).collect();
        obs[70..75].fill(N);
        let s = series(obs);
        let out = fill(
            &s,
            "flux_obs",
            "IP_lin",
            Interpolation::TimeLinear,
            Scenario::HalfHour,
            &FillingSettings::default(),
        )
        .unwrap();
        assert!(out.converged);
        for row in 1..3 * 48 - 1 {
            let v = out.values[row];
            assert!((v - row as f64).abs() < 1e-9, "row {row}: {v}");
        }
        // Edges clamp to the neighbour
        assert_eq!(out.values[0], 1.0);
    }

    #[test]
    fn day_scenario_uses_neighbouring_daily_means() {
        let obs: Vec<f64> = (0..3 * 48).map(|i| (i / 48) as f64 * 10.0).collect();
        let s = series(obs);
        let out = fill(
            &s,
            "flux_obs",
            "IP_lin",
            Interpolation::TimeLinear,
            Scenario::Day,
            &FillingSettings::default(),
        )
        .unwrap();
        assert_eq!(out.values[60], 10.0);
        assert_eq!(out.values[0], 10.0, "first day clamps to the next day's mean");
        assert_eq!(out.values[130], 10.0, "last day clamps to the previous day's mean");

        let mov = fill(
            &s,
            "flux_obs",
            "IP_mov",
            Interpolation::MovingAverage,
            Scenario::Day,
            &FillingSettings::default(),
        )
        .unwrap();
        // Window of three days around day 1: mean of days 0 and 2
        assert_eq!(mov.values[60], 10.0);
        assert_eq!(mov.residual_gaps, 0);
    }

    #[test]
    fn moving_average_widens_until_defined() {
        let mut obs = vec![2.0; 2 * 48];
        obs[40..48].fill(N);
        let s = series(obs);
        let out = fill(
            &s,
            "flux_obs",
            "IP_mov",
            Interpolation::MovingAverage,
            Scenario::HalfHour,
            &FillingSettings::default(),
        )
        .unwrap();
        assert_eq!(out.residual_gaps, 0);
        assert!(out.values.iter().all(|v| (*v - 2.0).abs() < 1e-12));
    }

    #[test]
    fn rolling_step_comes_from_settings() {
        let mut obs: Vec<f64> = (0..2 * 48).map(f64::from).collect();
        obs[40..46].fill(N);
        let s = series(obs);
        let run = |policy: &FillingSettings| {
            fill(&s, "flux_obs", "IP_mov", Interpolation::MovingAverage, Scenario::HalfHour, policy)
                .unwrap()
                .values[42]
        };

        // 5 and 7 hold fewer than two measured points, 9 covers rows 38..=46
        let default = run(&FillingSettings::default());
        assert!((default - 41.0).abs() < 1e-9, "default steps: {default}");

        // 5 then 15 covers rows 35..=49
        let wide = run(&FillingSettings {
            rolling_window_step: 10,
            ..FillingSettings::default()
        });
        assert!((wide - 375.0 / 9.0).abs() < 1e-9, "step 10: {wide}");
    }

    #[test]
    fn start_radius_comes_from_settings() {
        let s = series(vec![N; 2 * 48]);
        let policy = FillingSettings {
            interpolation_start_day_radius: 2,
            interpolation_max_day_radius: 3,
            ..FillingSettings::default()
        };
        let out = fill(
            &s,
            "flux_obs",
            "IP_lin",
            Interpolation::TimeLinear,
            Scenario::HalfHour,
            &policy,
        )
        .unwrap();
        assert_eq!(out.passes, 2, "radii 2 and 3 only");
    }

    #[test]
    fn empty_channel_hits_ceiling() {
        let s = series(vec![N; 2 * 48]);
        let policy = FillingSettings {
            interpolation_max_day_radius: 3,
            ..FillingSettings::default()
        };
        let out = fill(
            &s,
            "flux_obs",
            "IP_lin",
            Interpolation::TimeLinear,
            Scenario::HalfHour,
            &policy,
        )
        .unwrap();
        assert!(!out.converged);
        assert_eq!(out.residual_gaps, 96);
        assert_eq!(out.passes, 3);
    }
}
