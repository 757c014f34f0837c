//! Candidate-matching predicates.
//!
//! A [`Predicate`] names the covariates it needs; [`Predicate::bind`] resolves
//! them against a series once, before any fill loop runs, so matching is a
//! plain slice lookup per candidate.

use crate::config::CovariateBand;
use crate::series::{is_missing, SeriesError, TimeSeries};

/// Rule deciding whether a window point may stand in for the anchor.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Every window point qualifies (diurnal composites).
    Always,
    /// Anchor and candidate are both above, or both at-or-below, the light threshold.
    DayNight { covariate: String, threshold: f64 },
    /// Every band: `|candidate - anchor| <= tolerance`.
    Tolerance(Vec<CovariateBand>),
}

impl Predicate {
    /// Columns that must exist in the series.
    pub fn covariates(&self) -> Vec<&str> {
        match self {
            Self::Always => Vec::new(),
            Self::DayNight { covariate, .. } => vec![covariate.as_str()],
            Self::Tolerance(bands) => bands.iter().map(|b| b.name.as_str()).collect(),
        }
    }

    pub fn bind<'a>(&self, series: &'a TimeSeries) -> Result<BoundPredicate<'a>, SeriesError> {
        Ok(match self {
            Self::Always => BoundPredicate::Always,
            Self::DayNight { covariate, threshold } => BoundPredicate::DayNight {
                light: series.require(covariate)?,
                threshold: *threshold,
            },
            Self::Tolerance(bands) => BoundPredicate::Tolerance(
                bands
                    .iter()
                    .map(|b| series.require(&b.name).map(|values| (values, b.tolerance)))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }
}

/// A predicate resolved against one series.
#[derive(Debug, Clone)]
pub enum BoundPredicate<'a> {
    Always,
    DayNight { light: &'a [f64], threshold: f64 },
    Tolerance(Vec<(&'a [f64], f64)>),
}

impl BoundPredicate<'_> {
    /// Missing covariate values never match.
    pub fn matches(&self, candidate: usize, anchor: usize) -> bool {
        match self {
            Self::Always => true,
            Self::DayNight { light, threshold } => {
                let (c, a) = (light[candidate], light[anchor]);
                (c > *threshold && a > *threshold) || (c <= *threshold && a <= *threshold)
            }
            Self::Tolerance(bands) => bands.iter().all(|(values, tolerance)| {
                let (c, a) = (values[candidate], values[anchor]);
                !is_missing(c) && !is_missing(a) && (c - a).abs() <= *tolerance
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn series() -> TimeSeries {
        let mut rg = vec![0.0; 48];
        rg[20] = 300.0;
        rg[21] = 320.0;
        rg[22] = 400.0;
        rg[23] = f64::NAN;
        let mut ta: Vec<f64> = vec![10.0; 48];
        ta[21] = 14.0;
        TimeSeries::whole_days(NaiveDate::from_ymd_opt(2022, 5, 1).unwrap(), 1)
            .unwrap()
            .with_channel("Rg", rg)
            .unwrap()
            .with_channel("Tair", ta)
            .unwrap()
    }

    #[test]
    fn day_night_requires_same_side() {
        let s = series();
        let p = Predicate::DayNight {
            covariate: "Rg".to_string(),
            threshold: 10.0,
        };
        let bound = p.bind(&s).unwrap();
        assert!(bound.matches(21, 20));
        assert!(bound.matches(0, 1));
        assert!(!bound.matches(0, 20));
        assert!(!bound.matches(23, 20), "missing light never matches");
        assert!(!bound.matches(23, 0), "missing light never matches");
    }

    #[test]
    fn tolerance_is_conjunctive_and_inclusive() {
        let s = series();
        let p = Predicate::Tolerance(vec![
            CovariateBand::new("Rg", 50.0),
            CovariateBand::new("Tair", 2.5),
        ]);
        let bound = p.bind(&s).unwrap();
        assert!(!bound.matches(21, 20), "Tair differs by 4");
        assert!(!bound.matches(22, 20), "Rg differs by 100");
        assert!(bound.matches(0, 1));

        let rg_only = Predicate::Tolerance(vec![CovariateBand::new("Rg", 20.0)]);
        assert!(rg_only.bind(&s).unwrap().matches(21, 20), "boundary is inclusive");
        assert!(!rg_only.bind(&s).unwrap().matches(23, 20));
    }

    #[test]
    fn binding_reports_missing_covariate() {
        let s = series();
        let p = Predicate::Tolerance(vec![CovariateBand::new("VPD", 5.0)]);
        assert!(matches!(p.bind(&s), Err(SeriesError::MissingChannel(name)) if name == "VPD"));
        assert_eq!(p.covariates(), vec!["VPD"]);
        assert!(Predicate::Always.bind(&s).unwrap().matches(3, 40));
    }
}
