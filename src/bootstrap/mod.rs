//! Bootstrap Engine
//!
//! Scores every technique of one scenario against the observations it
//! predicted as artificial gaps, over many random resamples.
//!
//! ## Algorithm
//!
//! 1. Technique columns are the channels named `<Technique>_<scenario>`.
//! 2. Eligible rows have a measured observation and a value from every
//!    technique column. Rows lacking coverage are counted and logged.
//! 3. Each repetition draws `sample_percent` % of all rows with replacement
//!    (single rows for `hhs`, whole days expanded to 48 rows for `days`) and
//!    keeps the eligible ones, duplicates included.
//! 4. Per technique: Bias = mean(p − o), SDev = √2 · mean|p − o|,
//!    R2 = squared Pearson correlation.
//!
//! One generator seeded with `seed` draws a sub-seed per repetition before
//! any scoring starts, so sequential and parallel runs are bit-identical.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use statrs::statistics::Statistics;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::defaults::HALF_HOURS_PER_DAY;
use crate::config::{BootstrapSettings, Settings};
use crate::series::csv::{format_value, parse_value, Table};
use crate::series::{is_missing, SeriesError, TimeSeries};
use crate::types::{Scenario, Statistic, TimeOfDay};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Series(#[from] SeriesError),

    #[error("No technique columns for scenario '{0}'")]
    NoTechniques(Scenario),

    #[error("Sample percent must be in (0, 100], got {0}")]
    InvalidSamplePercent(f64),

    #[error("Repetitions must be greater than zero")]
    NoRepetitions,

    #[error("Time-of-day filter '{0}' needs a light covariate and threshold")]
    NoLightSplit(TimeOfDay),

    #[error("Malformed bootstrap table: {0}")]
    Table(String),
}

// ============================================================================
// Result
// ============================================================================

/// Statistic × repetition × technique, immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapResult {
    pub scenario: Scenario,
    pub time_of_day: TimeOfDay,
    /// Channel names (`<Technique>_<scenario>`) in series order.
    pub techniques: Vec<String>,
    pub repetitions: usize,
    pub eligible_points: usize,
    /// Measured rows left out for incomplete technique coverage.
    pub excluded_points: usize,
    values: Vec<f64>,
}

impl BootstrapResult {
    fn offset(&self, stat: Statistic, repetition: usize, technique: usize) -> usize {
        (stat.index() * self.repetitions + repetition) * self.techniques.len() + technique
    }

    pub fn get(&self, stat: Statistic, repetition: usize, technique: usize) -> f64 {
        self.values[self.offset(stat, repetition, technique)]
    }

    /// All repetitions of one statistic for one technique channel.
    pub fn distribution(&self, stat: Statistic, technique: &str) -> Option<Vec<f64>> {
        let t = self.techniques.iter().position(|name| name == technique)?;
        Some((0..self.repetitions).map(|r| self.get(stat, r, t)).collect())
    }

    /// Long table: `Statistic`, `Repetition`, one column per technique.
    pub fn to_table(&self) -> Table {
        let mut table = Table::new(
            ["Statistic".to_string(), "Repetition".to_string()]
                .into_iter()
                .chain(self.techniques.iter().cloned()),
        );
        for stat in Statistic::ALL {
            for rep in 0..self.repetitions {
                let mut row = vec![stat.to_string(), rep.to_string()];
                row.extend(
                    (0..self.techniques.len()).map(|t| format_value(self.get(stat, rep, t))),
                );
                table.push_row(row);
            }
        }
        table
    }

    /// Inverse of [`to_table`](Self::to_table); eligibility counts are not persisted.
    pub fn from_table(
        table: &Table,
        scenario: Scenario,
        time_of_day: TimeOfDay,
    ) -> Result<Self, BootstrapError> {
        let header = &table.header;
        if header.len() < 3 || header[0] != "Statistic" || header[1] != "Repetition" {
            return Err(BootstrapError::Table(
                "expected Statistic, Repetition and technique columns".into(),
            ));
        }
        let techniques: Vec<String> = table.header[2..].to_vec();
        if table.rows.len() % Statistic::ALL.len() != 0 {
            let rows = table.rows.len();
            return Err(BootstrapError::Table(format!("{rows} rows is not a multiple of 3")));
        }
        let repetitions = table.rows.len() / Statistic::ALL.len();

        let mut result = Self {
            scenario,
            time_of_day,
            techniques,
            repetitions,
            eligible_points: 0,
            excluded_points: 0,
            values: vec![f64::NAN; table.rows.len() * (table.header.len() - 2)],
        };
        for row in &table.rows {
            let stat = Statistic::parse(row[0].trim())
                .ok_or_else(|| BootstrapError::Table(format!("unknown statistic '{}'", row[0])))?;
            let rep: usize = row[1]
                .trim()
                .parse()
                .ok()
                .filter(|r| *r < repetitions)
                .ok_or_else(|| BootstrapError::Table(format!("bad repetition '{}'", row[1])))?;
            for (t, cell) in row[2..].iter().enumerate() {
                let value = parse_value(cell)
                    .ok_or_else(|| BootstrapError::Table(format!("bad value '{cell}'")))?;
                let offset = result.offset(stat, rep, t);
                result.values[offset] = value;
            }
        }
        Ok(result)
    }
}

// ============================================================================
// Entry Points
// ============================================================================

/// Bootstrap one scenario against the named observed channel.
pub fn bootstrap(
    series: &TimeSeries,
    observed: &str,
    scenario: Scenario,
    params: &BootstrapSettings,
    parallel: bool,
) -> Result<BootstrapResult, BootstrapError> {
    let obs = series.require(observed)?;
    bootstrap_observations(series, obs, scenario, TimeOfDay::FullTime, params, parallel)
}

/// Bootstrap one scenario with observations restricted to a time of day.
pub fn bootstrap_time_of_day(
    series: &TimeSeries,
    settings: &Settings,
    scenario: Scenario,
    time_of_day: TimeOfDay,
) -> Result<BootstrapResult, BootstrapError> {
    let obs = filter_time_of_day(series, settings, time_of_day)?;
    bootstrap_observations(
        series,
        &obs,
        scenario,
        time_of_day,
        &settings.bootstrap,
        settings.filling.parallel,
    )
}

/// Observed channel with values outside `time_of_day` set missing.
///
/// Rows whose light value is missing are kept in every filter.
pub fn filter_time_of_day(
    series: &TimeSeries,
    settings: &Settings,
    time_of_day: TimeOfDay,
) -> Result<Vec<f64>, BootstrapError> {
    let obs = series.require(settings.observed_channel())?;
    if time_of_day == TimeOfDay::FullTime {
        return Ok(obs.to_vec());
    }
    let (light_name, threshold) = settings
        .light_split()
        .ok_or(BootstrapError::NoLightSplit(time_of_day))?;
    let light = series.require(light_name)?;
    Ok(obs
        .iter()
        .zip(light)
        .map(|(&o, &l)| {
            let drop = match time_of_day {
                TimeOfDay::DayTime => l <= threshold,
                TimeOfDay::NightTime => l > threshold,
                TimeOfDay::FullTime => false,
            };
            if drop { f64::NAN } else { o }
        })
        .collect())
}

/// Technique channels of a scenario, in series order.
pub fn technique_channels(series: &TimeSeries, scenario: Scenario) -> Vec<String> {
    series
        .channel_names()
        .filter(|name| scenario.technique_of(name).is_some())
        .map(str::to_string)
        .collect()
}

/// Rows with a measurement and a value from every technique column.
pub fn eligible_rows(obs: &[f64], columns: &[&[f64]]) -> Vec<bool> {
    (0..obs.len())
        .map(|i| !is_missing(obs[i]) && columns.iter().all(|c| !is_missing(c[i])))
        .collect()
}

fn bootstrap_observations(
    series: &TimeSeries,
    obs: &[f64],
    scenario: Scenario,
    time_of_day: TimeOfDay,
    params: &BootstrapSettings,
    parallel: bool,
) -> Result<BootstrapResult, BootstrapError> {
    if !(params.sample_percent > 0.0 && params.sample_percent <= 100.0) {
        return Err(BootstrapError::InvalidSamplePercent(params.sample_percent));
    }
    if params.repetitions == 0 {
        return Err(BootstrapError::NoRepetitions);
    }

    let techniques = technique_channels(series, scenario);
    if techniques.is_empty() {
        return Err(BootstrapError::NoTechniques(scenario));
    }
    let columns: Vec<&[f64]> = techniques
        .iter()
        .map(|name| series.require(name))
        .collect::<Result<_, _>>()?;

    let eligible = eligible_rows(obs, &columns);
    let eligible_points = eligible.iter().filter(|e| **e).count();
    let measured = obs.iter().filter(|v| !is_missing(**v)).count();
    let excluded_points = measured - eligible_points;

    info!(
        scenario = %scenario,
        time_of_day = %time_of_day,
        eligible = eligible_points,
        "Artificial gaps available for bootstrapping"
    );
    if excluded_points > 0 {
        warn!(
            scenario = %scenario,
            time_of_day = %time_of_day,
            excluded = excluded_points,
            "Artificial gaps dropped for incomplete technique coverage"
        );
    }
    info!(
        repetitions = params.repetitions,
        percent = params.sample_percent,
        seed = params.seed,
        "Bootstrap settings"
    );

    let mut rng = StdRng::seed_from_u64(params.seed);
    let seeds: Vec<u64> = (0..params.repetitions).map(|_| rng.gen()).collect();

    let sampler = Sampler {
        rows: series.len(),
        days: series.num_days(),
        percent: params.sample_percent,
        scenario,
    };
    let score = |seed: &u64| {
        let sample = sampler.draw(*seed, &eligible);
        columns
            .iter()
            .map(|predicted| score_sample(predicted, obs, &sample))
            .collect::<Vec<[f64; 3]>>()
    };
    let scores: Vec<Vec<[f64; 3]>> = if parallel {
        seeds.par_iter().map(score).collect()
    } else {
        seeds.iter().map(score).collect()
    };

    let n_tech = techniques.len();
    let mut values = vec![f64::NAN; Statistic::ALL.len() * params.repetitions * n_tech];
    for (rep, per_technique) in scores.iter().enumerate() {
        for (t, stats) in per_technique.iter().enumerate() {
            for stat in Statistic::ALL {
                let offset = (stat.index() * params.repetitions + rep) * n_tech + t;
                values[offset] = stats[stat.index()];
            }
        }
    }

    let result = BootstrapResult {
        scenario,
        time_of_day,
        techniques,
        repetitions: params.repetitions,
        eligible_points,
        excluded_points,
        values,
    };
    log_summary(&result);
    Ok(result)
}

// ============================================================================
// Sampling and Scoring
// ============================================================================

struct Sampler {
    rows: usize,
    days: usize,
    percent: f64,
    scenario: Scenario,
}

impl Sampler {
    /// Rows of one repetition, with replacement, filtered to eligible rows.
    fn draw(&self, seed: u64, eligible: &[bool]) -> Vec<usize> {
        let mut rng = StdRng::seed_from_u64(seed);
        match self.scenario {
            Scenario::HalfHour => {
                let draws = (self.rows as f64 * self.percent / 100.0).floor() as usize;
                (0..draws)
                    .map(|_| rng.gen_range(0..self.rows))
                    .filter(|&r| eligible[r])
                    .collect()
            }
            Scenario::Day => {
                let draws = (self.days as f64 * self.percent / 100.0).floor() as usize;
                let mut sample = Vec::with_capacity(draws * HALF_HOURS_PER_DAY);
                for _ in 0..draws {
                    let day = rng.gen_range(0..self.days);
                    let start = day * HALF_HOURS_PER_DAY;
                    sample.extend((start..start + HALF_HOURS_PER_DAY).filter(|&r| eligible[r]));
                }
                sample
            }
        }
    }
}

/// `[Bias, SDev, R2]` over the sampled rows; `NaN` for an empty sample.
fn score_sample(predicted: &[f64], observed: &[f64], sample: &[usize]) -> [f64; 3] {
    if sample.is_empty() {
        return [f64::NAN; 3];
    }
    let n = sample.len() as f64;
    let (sum_diff, sum_abs) = sample.iter().fold((0.0, 0.0), |(s, a), &r| {
        let d = predicted[r] - observed[r];
        (s + d, a + d.abs())
    });
    let bias = sum_diff / n;
    let sdev = std::f64::consts::SQRT_2 * sum_abs / n;
    [bias, sdev, squared_pearson(predicted, observed, sample)]
}

fn squared_pearson(predicted: &[f64], observed: &[f64], sample: &[usize]) -> f64 {
    let n = sample.len() as f64;
    let mean_p = sample.iter().map(|&r| predicted[r]).sum::<f64>() / n;
    let mean_o = sample.iter().map(|&r| observed[r]).sum::<f64>() / n;
    let (mut cov, mut var_p, mut var_o) = (0.0, 0.0, 0.0);
    for &r in sample {
        let dp = predicted[r] - mean_p;
        let d_o = observed[r] - mean_o;
        cov += dp * d_o;
        var_p += dp * dp;
        var_o += d_o * d_o;
    }
    if var_p == 0.0 || var_o == 0.0 {
        return f64::NAN;
    }
    cov * cov / var_p / var_o
}

fn log_summary(result: &BootstrapResult) {
    let fmt = |values: &[f64]| {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        format!("{:.2} ±{:.2}", finite.iter().mean(), finite.iter().population_std_dev())
    };
    for name in &result.techniques {
        let stats: Vec<String> = Statistic::ALL
            .iter()
            .map(|&stat| result.distribution(stat, name).map_or_else(String::new, |d| fmt(&d)))
            .collect();
        info!(
            technique = %name,
            time_of_day = result.time_of_day.code(),
            bias = %stats[0],
            sdev = %stats[1],
            r2 = %stats[2],
            "Bootstrap summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn params(reps: usize) -> BootstrapSettings {
        BootstrapSettings {
            repetitions: reps,
            sample_percent: 50.0,
            seed: 99,
        }
    }

    fn series() -> TimeSeries {
        let n = 10 * 48;
        let obs: Vec<f64> = (0..n).map(|i| (i as f64 * 0.3).sin() * 5.0).collect();
        let noisy: Vec<f64> = obs
            .iter()
            .enumerate()
            .map(|(i, o)| o + if i % 2 == 0 { 1.0 } else { -0.5 })
            .collect();
        let mut partial = obs.clone();
        partial[5] = f64::NAN;
        TimeSeries::whole_days(NaiveDate::from_ymd_opt(2021, 3, 1).unwrap(), 10)
            .unwrap()
            .with_channel("flux_obs", obs.clone())
            .unwrap()
            .with_channel("A_hhs", obs)
            .unwrap()
            .with_channel("B_hhs", noisy)
            .unwrap()
            .with_channel("C_hhs", partial)
            .unwrap()
    }

    #[test]
    fn perfect_technique_scores_perfectly() {
        let result =
            bootstrap(&series(), "flux_obs", Scenario::HalfHour, &params(20), false).unwrap();
        assert_eq!(result.techniques, vec!["A_hhs", "B_hhs", "C_hhs"]);
        assert_eq!(result.excluded_points, 1);
        for rep in 0..20 {
            assert_eq!(result.get(Statistic::Bias, rep, 0), 0.0);
            assert_eq!(result.get(Statistic::SDev, rep, 0), 0.0);
            assert!((result.get(Statistic::R2, rep, 0) - 1.0).abs() < 1e-12);
            assert!(result.get(Statistic::SDev, rep, 1) > 0.0);
        }
    }

    #[test]
    fn parallel_scoring_is_bit_identical() {
        let s = series();
        let a = bootstrap(&s, "flux_obs", Scenario::Day, &params(15), false).unwrap();
        let b = bootstrap(&s, "flux_obs", Scenario::Day, &params(15), true).unwrap();
        assert_eq!(a.values.len(), b.values.len());
        assert!(a.values.iter().zip(&b.values).all(|(x, y)| x.to_bits() == y.to_bits()));
    }

    #[test]
    fn day_samples_are_whole_days() {
        let sampler = Sampler {
            rows: 480,
            days: 10,
            percent: 50.0,
            scenario: Scenario::Day,
        };
        let sample = sampler.draw(7, &vec![true; 480]);
        assert_eq!(sample.len(), 5 * 48);
        for chunk in sample.chunks(48) {
            assert_eq!(chunk[0] % 48, 0);
            assert!(chunk.windows(2).all(|w| w[1] == w[0] + 1));
        }
    }

    #[test]
    fn table_round_trip_keeps_values() {
        let result =
            bootstrap(&series(), "flux_obs", Scenario::HalfHour, &params(4), false).unwrap();
        let back =
            BootstrapResult::from_table(&result.to_table(), Scenario::HalfHour, TimeOfDay::FullTime)
                .unwrap();
        assert_eq!(back.techniques, result.techniques);
        assert_eq!(back.repetitions, 4);
        for stat in Statistic::ALL {
            assert_eq!(back.distribution(stat, "B_hhs"), result.distribution(stat, "B_hhs"));
        }
    }

    #[test]
    fn rejects_bad_parameters() {
        let s = series();
        let mut p = params(3);
        p.sample_percent = 0.0;
        assert!(matches!(
            bootstrap(&s, "flux_obs", Scenario::HalfHour, &p, false),
            Err(BootstrapError::InvalidSamplePercent(_))
        ));
        assert!(matches!(
            bootstrap(&s, "flux_obs", Scenario::Day, &params(3), false),
            Err(BootstrapError::NoTechniques(Scenario::Day))
        ));
    }

    #[test]
    fn time_of_day_filter_keeps_missing_light() {
        let mut settings = Settings::default();
        settings.light.threshold = 10.0;
        let obs = vec![1.0; 48];
        let mut rg = vec![0.0; 48];
        rg[20] = 100.0;
        rg[21] = f64::NAN;
        let s = TimeSeries::whole_days(NaiveDate::from_ymd_opt(2021, 3, 1).unwrap(), 1)
            .unwrap()
            .with_channel("flux_obs", obs)
            .unwrap()
            .with_channel("Rg", rg)
            .unwrap();
        let day = filter_time_of_day(&s, &settings, TimeOfDay::DayTime).unwrap();
        let night = filter_time_of_day(&s, &settings, TimeOfDay::NightTime).unwrap();
        assert_eq!(day.iter().filter(|v| !v.is_nan()).count(), 2);
        assert_eq!(night.iter().filter(|v| !v.is_nan()).count(), 47);
    }
}
