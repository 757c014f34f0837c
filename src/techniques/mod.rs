//! Technique Registry
//!
//! Declarative definitions of every built-in gap-filling technique, built once
//! per run from [`Settings`]. Look-up-table techniques and diurnal composites
//! share one shape (start radius, growth step, half-hour span, predicate);
//! the two interpolation techniques are tagged separately.
//!
//! Techniques whose covariates or thresholds are unusable in the settings are
//! left out rather than reported as errors.

pub mod predicate;

use tracing::{debug, info};

use crate::config::{CovariateBand, LutSettings, Settings};
use crate::window::HalfHourSpan;

pub use predicate::{BoundPredicate, Predicate};

/// Fill strategy of the interpolation techniques.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    /// Calendar-time linear interpolation, daily means for long gaps.
    TimeLinear,
    /// Centered rolling mean, rolling daily means for long gaps.
    MovingAverage,
}

/// Window-growth parameters of a look-up technique.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupSpec {
    pub start_days: u32,
    pub step_days: u32,
    pub span: HalfHourSpan,
    pub predicate: Predicate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TechniqueKind {
    Lookup(LookupSpec),
    Interpolation(Interpolation),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Technique {
    pub name: String,
    pub kind: TechniqueKind,
}

impl Technique {
    fn lookup(
        name: &str,
        start_days: u32,
        step_days: u32,
        span: HalfHourSpan,
        predicate: Predicate,
    ) -> Self {
        Self {
            name: name.to_string(),
            kind: TechniqueKind::Lookup(LookupSpec {
                start_days,
                step_days,
                span,
                predicate,
            }),
        }
    }

    fn interpolation(name: &str, method: Interpolation) -> Self {
        Self {
            name: name.to_string(),
            kind: TechniqueKind::Interpolation(method),
        }
    }

    /// Name of the technique that logs remaining gaps per window size.
    pub fn is_mds(&self) -> bool {
        self.name == MDS_TECHNIQUE
    }
}

/// MDS-style look-up table built from the `[mds]` covariates.
pub const MDS_TECHNIQUE: &str = "LUT_MDS_d7";

/// Ordered technique list for one run.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    techniques: Vec<Technique>,
}

impl Registry {
    /// Build every technique the settings support, in fixed order:
    /// interpolations, diurnal composites, LUT families, MDS.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut techniques = vec![
            Technique::interpolation("IP_lin", Interpolation::TimeLinear),
            Technique::interpolation("IP_mov", Interpolation::MovingAverage),
        ];

        if let Some((light, threshold)) = settings.light_split() {
            techniques.push(Technique::lookup(
                "WDM",
                0,
                1,
                HalfHourSpan::FullDay,
                Predicate::DayNight {
                    covariate: light.to_string(),
                    threshold,
                },
            ));
        } else {
            debug!("No usable light covariate, WDM not registered");
        }

        for (name, start, step, span) in [
            ("FDA_hh6", 0, 1, HalfHourSpan::ThreeHourBlock),
            ("MDA_hh5", 0, 1, HalfHourSpan::Radius(2)),
            ("MDC_d3", 3, 3, HalfHourSpan::Radius(0)),
            ("MDC_d7", 7, 7, HalfHourSpan::Radius(0)),
        ] {
            techniques.push(Technique::lookup(name, start, step, span, Predicate::Always));
        }

        let bands = settings.lut.usable();
        for (count, label) in [(1, "V1"), (2, "V1V2"), (3, "V1V2V3")] {
            if bands.len() < count {
                break;
            }
            for days in [3, 7] {
                techniques.push(Technique::lookup(
                    &format!("LUT_{label}_d{days}"),
                    days,
                    days,
                    HalfHourSpan::FullDay,
                    Predicate::Tolerance(bands[..count].to_vec()),
                ));
            }
        }

        if let Some(mds) = mds_bands(&settings.mds) {
            techniques.push(Technique::lookup(
                MDS_TECHNIQUE,
                7,
                7,
                HalfHourSpan::FullDay,
                Predicate::Tolerance(mds),
            ));
        } else {
            debug!(
                usable = settings.mds.usable().len(),
                "MDS needs three usable covariates, or two and no third, not registered"
            );
        }

        let registry = Self { techniques };
        info!(
            count = registry.len(),
            techniques = %registry.names().join(", "),
            "Technique registry built"
        );
        registry
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Technique> {
        self.techniques.iter()
    }

    pub fn len(&self) -> usize {
        self.techniques.len()
    }

    pub fn is_empty(&self) -> bool {
        self.techniques.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Technique> {
        self.techniques.iter().find(|t| t.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.techniques.iter().map(|t| t.name.as_str()).collect()
    }
}

/// All three MDS covariates, or the first two when no third is named.
fn mds_bands(mds: &LutSettings) -> Option<Vec<CovariateBand>> {
    let usable = mds.usable();
    let third_named = mds.covariates.get(2).is_some_and(|band| !band.name.trim().is_empty());
    match usable.len() {
        3 => Some(usable),
        2 if !third_named => Some(usable),
        _ => None,
    }
}

impl<'a> IntoIterator for &'a Registry {
    type Item = &'a Technique;
    type IntoIter = std::slice::Iter<'a, Technique>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_settings_register_everything_in_order() {
        let registry = Registry::from_settings(&Settings::default());
        assert_eq!(
            registry.names(),
            vec![
                "IP_lin",
                "IP_mov",
                "WDM",
                "FDA_hh6",
                "MDA_hh5",
                "MDC_d3",
                "MDC_d7",
                "LUT_V1_d3",
                "LUT_V1_d7",
                "LUT_V1V2_d3",
                "LUT_V1V2_d7",
                "LUT_V1V2V3_d3",
                "LUT_V1V2V3_d7",
                "LUT_MDS_d7",
            ]
        );
    }

    #[test]
    fn missing_covariates_degrade_gracefully() {
        let mut settings = Settings::default();
        settings.light.covariate.clear();
        settings.lut = LutSettings {
            covariates: vec![
                CovariateBand::new("Rg", 50.0),
                CovariateBand::new("Tair", f64::NAN),
            ],
        };
        settings.mds = LutSettings {
            covariates: vec![CovariateBand::new("Rg", 50.0)],
        };
        let registry = Registry::from_settings(&settings);
        assert!(registry.get("WDM").is_none());
        assert!(registry.get("LUT_V1_d7").is_some());
        assert!(registry.get("LUT_V1V2_d3").is_none());
        assert!(registry.get(MDS_TECHNIQUE).is_none());
        assert_eq!(registry.len(), 8);
    }

    #[test]
    fn mds_needs_all_named_covariates() {
        let with_mds = |covariates: Vec<CovariateBand>| {
            let mut settings = Settings::default();
            settings.mds = LutSettings { covariates };
            Registry::from_settings(&settings).get(MDS_TECHNIQUE).is_some()
        };
        let rg = || CovariateBand::new("Rg", 50.0);
        let tair = || CovariateBand::new("Tair", 2.5);

        assert!(with_mds(vec![rg(), tair(), CovariateBand::new("VPD", 5.0)]));
        assert!(with_mds(vec![rg(), tair()]), "no third covariate");
        assert!(with_mds(vec![rg(), tair(), CovariateBand::new("", f64::NAN)]), "unnamed third");
        assert!(
            !with_mds(vec![rg(), tair(), CovariateBand::new("VPD", f64::NAN)]),
            "named third without a tolerance suppresses MDS"
        );
        assert!(!with_mds(vec![rg(), CovariateBand::new("Tair", f64::NAN)]));
    }

    #[test]
    fn lut_parameters_follow_name() {
        let registry = Registry::from_settings(&Settings::default());
        let Some(TechniqueKind::Lookup(spec)) = registry.get("LUT_V1V2_d3").map(|t| &t.kind) else {
            panic!("LUT_V1V2_d3 must be a lookup technique");
        };
        assert_eq!((spec.start_days, spec.step_days), (3, 3));
        assert_eq!(spec.span, HalfHourSpan::FullDay);
        assert_eq!(spec.predicate.covariates(), vec!["Rg", "Tair"]);

        let Some(TechniqueKind::Lookup(fda)) = registry.get("FDA_hh6").map(|t| &t.kind) else {
            panic!("FDA_hh6 must be a lookup technique");
        };
        assert_eq!(fda.span, HalfHourSpan::ThreeHourBlock);
        assert_eq!(fda.predicate, Predicate::Always);
    }
}
