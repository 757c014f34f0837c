//! Time-Index Window Generator
//!
//! Produces the half-hour stamps around an anchor that a filling technique
//! may draw from. Stamps are right-closed, so every calculation runs on the
//! anchor shifted back by 15 minutes (`00:00` then still belongs to the
//! previous day) and the result is shifted forward again.
//!
//! ## Half-hour spans
//!
//! | Span | Stamps per included day |
//! |---|---|
//! | `FullDay` | all 48 half-hours |
//! | `ThreeHourBlock` | the aligned 3-hour block holding the anchor (6 stamps) |
//! | `Radius(n)` | anchor time ± `n` half-hours |
//!
//! Included days are the anchor day plus `day_radius` days on each side.

use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};

use crate::series::{half_hour, stamp_shift, TimeSeries};
use crate::types::Scenario;

/// Half-hours per 3-hour block.
const BLOCK_HALF_HOURS: i32 = 6;

/// Which half-hours of each included day enter the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HalfHourSpan {
    FullDay,
    ThreeHourBlock,
    Radius(u32),
}

impl HalfHourSpan {
    /// Decode the legacy integer radius (`-1` full day, `-6` 3-hour block).
    pub fn from_radius(radius: i32) -> Option<Self> {
        match radius {
            -1 => Some(Self::FullDay),
            -6 => Some(Self::ThreeHourBlock),
            r => u32::try_from(r).ok().map(Self::Radius),
        }
    }

    pub fn as_radius(self) -> i32 {
        match self {
            Self::FullDay => -1,
            Self::ThreeHourBlock => -6,
            Self::Radius(r) => i32::try_from(r).unwrap_or(i32::MAX),
        }
    }
}

/// Points removed from the window to simulate an artificial gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Exclusion {
    None,
    HalfHour,
    Day,
}

impl From<Scenario> for Exclusion {
    fn from(scenario: Scenario) -> Self {
        match scenario {
            Scenario::HalfHour => Self::HalfHour,
            Scenario::Day => Self::Day,
        }
    }
}

/// Chronologically sorted, deduplicated stamps around `anchor`.
pub fn generate_window(
    anchor: NaiveDateTime,
    day_radius: u32,
    span: HalfHourSpan,
    exclusion: Exclusion,
) -> Vec<NaiveDateTime> {
    let mid = anchor - stamp_shift();
    let days = i64::from(day_radius);
    let step = half_hour();

    let mut stamps: Vec<NaiveDateTime> = match span {
        HalfHourSpan::FullDay => {
            let first_day = mid.date() - Duration::days(days);
            let first = first_day.and_time(NaiveTime::MIN) + stamp_shift();
            let count = (2 * days + 1) * 48;
            (0..count).map(|k| first + step * as_i32(k)).collect()
        }
        HalfHourSpan::ThreeHourBlock => {
            let block_hour = mid.hour() / 3 * 3;
            let block_start = mid.date().and_time(NaiveTime::MIN)
                + Duration::hours(i64::from(block_hour))
                + stamp_shift();
            (-days..=days)
                .flat_map(|d| {
                    (0..BLOCK_HALF_HOURS).map(move |k| block_start + Duration::days(d) + step * k)
                })
                .collect()
        }
        HalfHourSpan::Radius(n) => {
            let n = i32::try_from(n).unwrap_or(i32::MAX);
            (-days..=days)
                .flat_map(|d| (-n..=n).map(move |k| mid + Duration::days(d) + step * k))
                .collect()
        }
    };

    match exclusion {
        Exclusion::None => {}
        Exclusion::HalfHour => stamps.retain(|t| *t != mid),
        Exclusion::Day => {
            let day = mid.date();
            stamps.retain(|t| t.date() != day);
        }
    }

    stamps.sort_unstable();
    stamps.dedup();
    stamps.into_iter().map(|t| t + stamp_shift()).collect()
}

fn as_i32(k: i64) -> i32 {
    i32::try_from(k).unwrap_or(i32::MAX)
}

/// Rows of `series` covered by the window around `row`; stamps outside the series are dropped.
pub fn window_rows(
    series: &TimeSeries,
    row: usize,
    day_radius: u32,
    span: HalfHourSpan,
    exclusion: Exclusion,
) -> Vec<usize> {
    generate_window(series.timestamp(row), day_radius, span, exclusion)
        .into_iter()
        .filter_map(|t| series.index_of(t))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 7, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    const SPANS: [HalfHourSpan; 4] = [
        HalfHourSpan::FullDay,
        HalfHourSpan::ThreeHourBlock,
        HalfHourSpan::Radius(0),
        HalfHourSpan::Radius(2),
    ];

    #[test]
    fn half_hour_exclusion_never_contains_anchor() {
        let start = at(10, 0, 30);
        for step in 0..96 {
            let anchor = start + half_hour() * step;
            for span in SPANS {
                for d in 0..3 {
                    let none = generate_window(anchor, d, span, Exclusion::None);
                    let hh = generate_window(anchor, d, span, Exclusion::HalfHour);
                    assert!(none.contains(&anchor), "{anchor} {span:?} d={d} none");
                    assert!(!hh.contains(&anchor), "{anchor} {span:?} d={d} half-hour");
                    assert_eq!(none.len(), hh.len() + 1);
                }
            }
        }
    }

    #[test]
    fn full_day_window_spans_whole_days() {
        let w = generate_window(at(10, 12, 0), 1, HalfHourSpan::FullDay, Exclusion::None);
        assert_eq!(w.len(), 3 * 48);
        assert_eq!(w[0], at(9, 0, 30));
        assert_eq!(*w.last().unwrap(), at(12, 0, 0));
        assert!(w.windows(2).all(|p| p[1] - p[0] == half_hour()));
    }

    #[test]
    fn midnight_belongs_to_previous_day() {
        let anchor = at(11, 0, 0);
        let w = generate_window(anchor, 0, HalfHourSpan::FullDay, Exclusion::None);
        assert_eq!(w.first(), Some(&at(10, 0, 30)));
        assert_eq!(w.last(), Some(&anchor));

        let day = generate_window(anchor, 1, HalfHourSpan::FullDay, Exclusion::Day);
        assert_eq!(day.len(), 2 * 48);
        assert!(!day.iter().any(|t| *t > at(10, 0, 0) && *t <= at(11, 0, 0)));
    }

    #[test]
    fn three_hour_block_is_aligned() {
        let w = generate_window(at(10, 13, 30), 1, HalfHourSpan::ThreeHourBlock, Exclusion::None);
        assert_eq!(w.len(), 18);
        assert_eq!(w[0], at(9, 12, 30));
        assert_eq!(w[5], at(9, 15, 0));
        assert_eq!(w[6], at(10, 12, 30));

        // 15:00 closes the 12:00-15:00 block
        let edge = generate_window(at(10, 15, 0), 0, HalfHourSpan::ThreeHourBlock, Exclusion::None);
        assert_eq!(edge.first(), Some(&at(10, 12, 30)));
        assert_eq!(edge.last(), Some(&at(10, 15, 0)));
    }

    #[test]
    fn radius_replicates_across_days() {
        let anchor = at(10, 6, 0);
        let w = generate_window(anchor, 2, HalfHourSpan::Radius(1), Exclusion::Day);
        assert_eq!(w.len(), 4 * 3);
        assert!(w.contains(&at(8, 5, 30)));
        assert!(w.contains(&at(12, 6, 30)));
        assert!(!w.contains(&anchor));
    }

    #[test]
    fn legacy_radius_decoding() {
        assert_eq!(HalfHourSpan::from_radius(-1), Some(HalfHourSpan::FullDay));
        assert_eq!(HalfHourSpan::from_radius(-6), Some(HalfHourSpan::ThreeHourBlock));
        assert_eq!(HalfHourSpan::from_radius(2), Some(HalfHourSpan::Radius(2)));
        assert_eq!(HalfHourSpan::from_radius(-3), None);
        assert_eq!(HalfHourSpan::Radius(5).as_radius(), 5);
    }

    #[test]
    fn window_rows_clip_to_series() {
        let day = NaiveDate::from_ymd_opt(2021, 7, 1).unwrap();
        let series = TimeSeries::whole_days(day, 2).unwrap();
        let rows = window_rows(&series, 0, 1, HalfHourSpan::FullDay, Exclusion::None);
        assert_eq!(rows, (0..96).collect::<Vec<_>>());
    }
}
