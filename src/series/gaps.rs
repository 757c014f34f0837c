//! Gap runs: maximal stretches of missing values in one channel.

use serde::Serialize;

use super::is_missing;

/// A maximal contiguous run of missing values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapRun {
    pub start: usize,
    pub len: usize,
}

impl GapRun {
    /// One past the last row of the run.
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    pub fn is_short(&self, threshold: usize) -> bool {
        self.len <= threshold
    }
}

/// All gap runs, in row order.
pub fn gap_runs(values: &[f64]) -> Vec<GapRun> {
    let mut runs = Vec::new();
    let mut start: Option<usize> = None;
    for (i, &v) in values.iter().enumerate() {
        match (is_missing(v), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                runs.push(GapRun { start: s, len: i - s });
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push(GapRun {
            start: s,
            len: values.len() - s,
        });
    }
    runs
}

/// Length of the run each row belongs to; zero for present values.
pub fn run_lengths(values: &[f64]) -> Vec<usize> {
    let mut lengths = vec![0; values.len()];
    for run in gap_runs(values) {
        lengths[run.start..run.end()].fill(run.len);
    }
    lengths
}

pub fn longest_gap(values: &[f64]) -> usize {
    gap_runs(values).iter().map(|r| r.len).max().unwrap_or(0)
}

/// Missing points split by the length class of their run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GapClasses {
    pub short_points: usize,
    pub long_points: usize,
}

impl GapClasses {
    pub fn total(&self) -> usize {
        self.short_points + self.long_points
    }
}

pub fn classify(values: &[f64], short_threshold: usize) -> GapClasses {
    gap_runs(values)
        .iter()
        .fold(GapClasses::default(), |mut acc, run| {
            if run.is_short(short_threshold) {
                acc.short_points += run.len;
            } else {
                acc.long_points += run.len;
            }
            acc
        })
}

// ============================================================================
// Gap Distribution
// ============================================================================

/// One line of the gap-length histogram.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GapDistributionRow {
    /// Gap length in half-hours.
    pub length: usize,
    /// Number of runs of this length.
    pub runs: usize,
    /// Missing half-hours in runs of this length.
    pub half_hours: usize,
    /// Cumulative share of all missing half-hours (percent).
    pub cumulative_gap_percent: f64,
    /// Cumulative share of all rows (percent).
    pub cumulative_data_percent: f64,
}

/// Histogram of gap lengths, shortest first.
pub fn gap_distribution(values: &[f64]) -> Vec<GapDistributionRow> {
    let runs = gap_runs(values);
    let total_missing: usize = runs.iter().map(|r| r.len).sum();
    let mut lengths: Vec<usize> = runs.iter().map(|r| r.len).collect();
    lengths.sort_unstable();
    lengths.dedup();

    let mut cumulative = 0usize;
    lengths
        .into_iter()
        .map(|length| {
            let count = runs.iter().filter(|r| r.len == length).count();
            let half_hours = count * length;
            cumulative += half_hours;
            GapDistributionRow {
                length,
                runs: count,
                half_hours,
                cumulative_gap_percent: percent(cumulative, total_missing),
                cumulative_data_percent: percent(cumulative, values.len()),
            }
        })
        .collect()
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}
