//! Half-Hourly Time Series
//!
//! A [`TimeSeries`] is a strictly regular table: one timestamp per half-hour
//! (right-closed interval end, so a day runs from `00:30` to `00:00` of the
//! next calendar day) and any number of named numeric channels. `NaN` marks a
//! missing value in every channel.
//!
//! ## Invariants (checked at construction)
//!
//! - timestamps strictly increasing, exactly 30 minutes apart
//! - first stamp at `00:30`, row count a multiple of 48
//!
//! Violations are [`SeriesError`]s; nothing is silently repaired.

pub mod csv;
pub mod gaps;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::defaults::{
    HALF_HOURS_PER_DAY, HALF_HOUR_MINUTES, OBSERVED_CHANNEL, STAMP_SHIFT_MINUTES,
};
use crate::config::FluxSettings;

pub use gaps::GapRun;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum SeriesError {
    #[error("Series is empty")]
    Empty,

    #[error("Series must start at 00:30, first stamp is {0}")]
    MisalignedStart(NaiveDateTime),

    #[error("Irregular cadence at row {row}: {previous} followed by {current}")]
    Irregular {
        row: usize,
        previous: NaiveDateTime,
        current: NaiveDateTime,
    },

    #[error("Series covers partial days: {rows} rows is not a multiple of 48")]
    PartialDays { rows: usize },

    #[error("Channel '{0}' not found")]
    MissingChannel(String),

    #[error("Channel '{name}' has {found} values, series has {expected} rows")]
    LengthMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("Input already contains a '{0}' column")]
    ObservedExists(String),

    #[error("Longest gap in '{channel}' spans {longest} half-hours, limit is {limit}")]
    GapTooLong {
        channel: String,
        longest: usize,
        limit: usize,
    },

    #[error("I/O error ({}): {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error ({}:{line}): {message}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

/// Missing-value convention shared by every channel.
#[inline]
pub fn is_missing(value: f64) -> bool {
    !value.is_finite()
}

/// Shift between a right-closed stamp and the instant used for calendar arithmetic.
pub fn stamp_shift() -> TimeDelta {
    TimeDelta::minutes(STAMP_SHIFT_MINUTES)
}

/// Spacing between consecutive rows.
pub fn half_hour() -> TimeDelta {
    TimeDelta::minutes(HALF_HOUR_MINUTES)
}

/// Calendar day a right-closed half-hour stamp belongs to.
pub fn day_of(stamp: NaiveDateTime) -> NaiveDate {
    (stamp - stamp_shift()).date()
}

// ============================================================================
// TimeSeries
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub name: String,
    pub values: Vec<f64>,
}

/// Regular half-hourly table with named channels (insertion ordered).
#[derive(Debug, Clone)]
pub struct TimeSeries {
    timestamps: Vec<NaiveDateTime>,
    channels: Vec<Channel>,
}

impl TimeSeries {
    /// Build an empty-channel series, checking every layout invariant.
    pub fn new(timestamps: Vec<NaiveDateTime>) -> Result<Self, SeriesError> {
        let first = *timestamps.first().ok_or(SeriesError::Empty)?;
        let day_start = NaiveTime::MIN + half_hour();
        if first.time() != day_start {
            return Err(SeriesError::MisalignedStart(first));
        }

        for (row, pair) in timestamps.windows(2).enumerate() {
            if pair[1] - pair[0] != half_hour() {
                return Err(SeriesError::Irregular {
                    row: row + 1,
                    previous: pair[0],
                    current: pair[1],
                });
            }
        }

        if timestamps.len() % HALF_HOURS_PER_DAY != 0 {
            return Err(SeriesError::PartialDays {
                rows: timestamps.len(),
            });
        }

        Ok(Self {
            timestamps,
            channels: Vec::new(),
        })
    }

    /// Regular series of `days` whole days starting on `first_day`.
    pub fn whole_days(first_day: NaiveDate, days: usize) -> Result<Self, SeriesError> {
        let start = first_day.and_time(NaiveTime::MIN) + half_hour();
        let stamps = (0..days * HALF_HOURS_PER_DAY)
            .map(|i| start + half_hour() * i32::try_from(i).unwrap_or(i32::MAX))
            .collect();
        Self::new(stamps)
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn num_days(&self) -> usize {
        self.len() / HALF_HOURS_PER_DAY
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn timestamp(&self, row: usize) -> NaiveDateTime {
        self.timestamps[row]
    }

    /// Row of a stamp, computed from the regular cadence.
    pub fn index_of(&self, stamp: NaiveDateTime) -> Option<usize> {
        let offset = stamp - *self.timestamps.first()?;
        if offset < TimeDelta::zero()
            || offset.subsec_nanos() != 0
            || offset.num_seconds() % 60 != 0
        {
            return None;
        }
        let minutes = offset.num_minutes();
        if minutes % HALF_HOUR_MINUTES != 0 {
            return None;
        }
        let row = usize::try_from(minutes / HALF_HOUR_MINUTES).ok()?;
        (row < self.len()).then_some(row)
    }

    /// Calendar-day position (0-based) of a row.
    pub fn day_index(&self, row: usize) -> usize {
        row / HALF_HOURS_PER_DAY
    }

    /// Rows belonging to calendar-day position `day`.
    pub fn day_rows(&self, day: usize) -> std::ops::Range<usize> {
        let start = day * HALF_HOURS_PER_DAY;
        start.min(self.len())..(start + HALF_HOURS_PER_DAY).min(self.len())
    }

    // ------------------------------------------------------------------------
    // Channels
    // ------------------------------------------------------------------------

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|c| c.name.as_str())
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.channels.iter().any(|c| c.name == name)
    }

    pub fn channel(&self, name: &str) -> Option<&[f64]> {
        self.channels
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    /// Like [`channel`](Self::channel) but a missing channel is an error.
    pub fn require(&self, name: &str) -> Result<&[f64], SeriesError> {
        self.channel(name)
            .ok_or_else(|| SeriesError::MissingChannel(name.to_string()))
    }

    /// True when the channel exists and holds no missing value.
    pub fn is_complete(&self, name: &str) -> bool {
        self.channel(name)
            .is_some_and(|values| values.iter().all(|v| !is_missing(*v)))
    }

    /// Add a channel, replacing any channel of the same name in place.
    pub fn insert_channel(
        &mut self,
        name: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<(), SeriesError> {
        let name = name.into();
        if values.len() != self.len() {
            return Err(SeriesError::LengthMismatch {
                name,
                expected: self.len(),
                found: values.len(),
            });
        }
        match self.channels.iter_mut().find(|c| c.name == name) {
            Some(existing) => existing.values = values,
            None => self.channels.push(Channel { name, values }),
        }
        Ok(())
    }

    /// Builder form of [`insert_channel`](Self::insert_channel).
    pub fn with_channel(
        mut self,
        name: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<Self, SeriesError> {
        self.insert_channel(name, values)?;
        Ok(self)
    }

    pub fn remove_channel(&mut self, name: &str) -> Option<Vec<f64>> {
        let pos = self.channels.iter().position(|c| c.name == name)?;
        Some(self.channels.remove(pos).values)
    }

    // ------------------------------------------------------------------------
    // Observed Channel
    // ------------------------------------------------------------------------

    /// Derive `flux_obs` from the configured flux column.
    ///
    /// The missing-value sentinel becomes `NaN`; with a flag column, only
    /// values flagged at or below `flag_max` survive, so a missing flag
    /// discards the value.
    pub fn prepare_observed(&mut self, flux: &FluxSettings) -> Result<(), SeriesError> {
        if self.has_channel(OBSERVED_CHANNEL) {
            return Err(SeriesError::ObservedExists(OBSERVED_CHANNEL.to_string()));
        }

        let raw = self.require(&flux.column)?;
        let mut observed: Vec<f64> = raw
            .iter()
            .map(|&v| if v == flux.missing_value { f64::NAN } else { v })
            .collect();

        let mut flagged = 0usize;
        if let Some(flag_column) = &flux.flag_column {
            let flags = self.require(flag_column)?;
            for (value, &flag) in observed.iter_mut().zip(flags) {
                let accepted = flag <= flux.flag_max;
                if !accepted && !is_missing(*value) {
                    *value = f64::NAN;
                    flagged += 1;
                }
            }
        }

        let measured = observed.iter().filter(|v| !is_missing(**v)).count();
        info!(
            column = %flux.column,
            measured,
            flagged,
            rows = self.len(),
            "Observed channel prepared"
        );
        self.insert_channel(OBSERVED_CHANNEL, observed)
    }

    /// Fail when a gap in `channel` is longer than `max_gap_days` days.
    pub fn check_gap_limit(&self, channel: &str, max_gap_days: usize) -> Result<(), SeriesError> {
        let values = self.require(channel)?;
        let longest = gaps::longest_gap(values);
        let limit = max_gap_days * HALF_HOURS_PER_DAY;
        debug!(channel, longest, limit, "Longest gap checked");
        if longest > limit {
            return Err(SeriesError::GapTooLong {
                channel: channel.to_string(),
                longest,
                limit,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 6, d).unwrap()
    }

    #[test]
    fn whole_days_layout() {
        let series = TimeSeries::whole_days(day(1), 2).unwrap();
        assert_eq!(series.len(), 96);
        assert_eq!(series.timestamp(0).time(), NaiveTime::from_hms_opt(0, 30, 0).unwrap());
        // The last stamp of day one is midnight of the next calendar day
        assert_eq!(series.timestamp(47), day(2).and_time(NaiveTime::MIN));
        assert_eq!(day_of(series.timestamp(47)), day(1));
        assert_eq!(day_of(series.timestamp(48)), day(2));
    }

    #[test]
    fn rejects_irregular_and_partial_series() {
        let series = TimeSeries::whole_days(day(1), 1).unwrap();
        let mut stamps = series.timestamps().to_vec();
        stamps[10] = stamps[9];
        assert!(matches!(TimeSeries::new(stamps), Err(SeriesError::Irregular { row: 10, .. })));

        let mut stamps = series.timestamps().to_vec();
        stamps.pop();
        assert!(matches!(TimeSeries::new(stamps), Err(SeriesError::PartialDays { rows: 47 })));

        let shifted: Vec<_> = series.timestamps().iter().map(|t| *t + half_hour()).collect();
        assert!(matches!(TimeSeries::new(shifted), Err(SeriesError::MisalignedStart(_))));

        assert!(matches!(TimeSeries::new(Vec::new()), Err(SeriesError::Empty)));
    }

    #[test]
    fn index_of_uses_cadence() {
        let series = TimeSeries::whole_days(day(1), 2).unwrap();
        assert_eq!(series.index_of(series.timestamp(57)), Some(57));
        assert_eq!(series.index_of(series.timestamp(0) - half_hour()), None);
        assert_eq!(series.index_of(series.timestamp(95) + half_hour()), None);
        assert_eq!(series.index_of(series.timestamp(3) + TimeDelta::minutes(15)), None);
    }

    #[test]
    fn prepare_observed_applies_sentinel_and_flags() {
        let mut flux = vec![1.0; 48];
        flux[3] = -9999.0;
        let mut flags = vec![0.0; 48];
        flags[5] = 2.0;
        flags[6] = f64::NAN;
        flags[7] = 1.0;
        let mut series = TimeSeries::whole_days(day(1), 1)
            .unwrap()
            .with_channel("FC", flux)
            .unwrap()
            .with_channel("QC", flags)
            .unwrap();

        let settings = FluxSettings {
            flag_column: Some("QC".to_string()),
            ..FluxSettings::default()
        };
        series.prepare_observed(&settings).unwrap();
        let obs = series.channel(OBSERVED_CHANNEL).unwrap();
        assert!(obs[3].is_nan(), "sentinel must become missing");
        assert!(obs[5].is_nan(), "flagged value must become missing");
        assert!(obs[6].is_nan(), "value without a flag must become missing");
        assert_eq!(obs[7], 1.0, "flag equal to flag_max is accepted");
        assert_eq!(obs[4], 1.0);

        assert!(matches!(
            series.prepare_observed(&settings),
            Err(SeriesError::ObservedExists(_))
        ));
    }

    #[test]
    fn gap_limit_is_fatal() {
        let mut values = vec![1.0; 96];
        for v in values.iter_mut().take(60) {
            *v = f64::NAN;
        }
        let series = TimeSeries::whole_days(day(1), 2)
            .unwrap()
            .with_channel("x", values)
            .unwrap();
        assert!(series.check_gap_limit("x", 2).is_ok());
        assert!(matches!(
            series.check_gap_limit("x", 1),
            Err(SeriesError::GapTooLong { longest: 60, limit: 48, .. })
        ));
    }

    #[test]
    fn insert_rejects_wrong_length() {
        let mut series = TimeSeries::whole_days(day(1), 1).unwrap();
        assert!(matches!(
            series.insert_channel("x", vec![0.0; 3]),
            Err(SeriesError::LengthMismatch { expected: 48, found: 3, .. })
        ));
    }
}
