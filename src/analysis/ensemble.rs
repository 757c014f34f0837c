//! Ensemble selection and envelope.

use regex::Regex;
use serde::Serialize;
use tracing::info;

use super::sums::PeriodSum;
use super::{round_dec, AnalysisError};
use crate::config::defaults::{ENSEMBLE_DECIMALS, NH3_ENSEMBLE_PATTERN};
use crate::series::csv::{format_value, Table};

/// Envelope of the selected techniques' totals and confidence bounds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnsembleResult {
    pub upper_ci: f64,
    pub upper_unc: f64,
    pub upper_tot: f64,
    /// Spread of the totals (max − min).
    pub delta: f64,
    pub lower_tot: f64,
    pub lower_unc: f64,
    pub lower_ci: f64,
    pub total_ci: f64,
}

/// Default inclusion pattern for a gas; `None` keeps every technique.
pub fn default_pattern(gas: &str) -> Option<&'static str> {
    gas.eq_ignore_ascii_case("NH3").then_some(NH3_ENSEMBLE_PATTERN)
}

/// Keep the sums whose technique name matches `pattern` anywhere.
///
/// Without a pattern the gas default applies; an empty result is an error.
pub fn select_techniques(
    sums: &[PeriodSum],
    pattern: Option<&str>,
    gas: &str,
) -> Result<Vec<PeriodSum>, AnalysisError> {
    let Some(pattern) = pattern.or_else(|| default_pattern(gas)) else {
        return non_empty(sums.to_vec(), "");
    };
    let re = Regex::new(pattern).map_err(|source| AnalysisError::Pattern {
        pattern: pattern.to_string(),
        source,
    })?;
    let selected: Vec<PeriodSum> =
        sums.iter().filter(|s| re.is_match(&s.technique)).cloned().collect();
    info!(pattern, selected = selected.len(), of = sums.len(), "Ensemble techniques selected");
    non_empty(selected, pattern)
}

fn non_empty(selected: Vec<PeriodSum>, pattern: &str) -> Result<Vec<PeriodSum>, AnalysisError> {
    if selected.is_empty() {
        Err(AnalysisError::EmptyEnsemble(pattern.to_string()))
    } else {
        Ok(selected)
    }
}

fn extremes(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)))
}

pub fn ensemble(sums: &[PeriodSum]) -> Result<EnsembleResult, AnalysisError> {
    if sums.is_empty() {
        return Err(AnalysisError::EmptyEnsemble(String::new()));
    }
    let (min_tot, max_tot) = extremes(sums.iter().map(|s| s.sum_total));
    let (min_lower, _) = extremes(sums.iter().map(|s| s.lower_ci));
    let (_, max_upper) = extremes(sums.iter().map(|s| s.upper_ci));
    let r = |v: f64| round_dec(v, ENSEMBLE_DECIMALS);

    Ok(EnsembleResult {
        upper_ci: r(max_upper),
        upper_unc: r(max_upper - max_tot),
        upper_tot: r(max_tot),
        delta: r(max_tot - min_tot),
        lower_tot: r(min_tot),
        lower_unc: r(min_lower - min_tot),
        lower_ci: r(min_lower),
        total_ci: r(max_upper - min_lower),
    })
}

impl EnsembleResult {
    pub fn rows(&self) -> [(&'static str, f64); 8] {
        [
            ("UpperCI", self.upper_ci),
            ("UpperUnc", self.upper_unc),
            ("UpperTot", self.upper_tot),
            ("Delta", self.delta),
            ("LowerTot", self.lower_tot),
            ("LowerUnc", self.lower_unc),
            ("LowerCI", self.lower_ci),
            ("TotalCI", self.total_ci),
        ]
    }

    pub fn to_table(&self, gas: &str, sum_unit: &str) -> Table {
        let mut table = Table::new(["EnsStats".to_string(), format!("{gas} ({sum_unit})")]);
        for (name, value) in self.rows() {
            table.push_row(vec![name.to_string(), format_value(value)]);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum(technique: &str, total: f64, error: f64) -> PeriodSum {
        PeriodSum {
            technique: technique.to_string(),
            sum_obs: 0.0,
            sum_fill_real: total,
            sum_total: total,
            miss_fill_real: 0,
            random_all: error,
            bias_gaps: 0.0,
            error_total: error,
            lower_ci: total - error,
            upper_ci: total + error,
        }
    }

    #[test]
    fn envelope_over_totals_and_bounds() {
        let sums = [sum("A", 100.0, 10.0), sum("B", 120.0, 2.0), sum("C", 90.0, 30.0)];
        let ens = ensemble(&sums).unwrap();
        assert_eq!(ens.upper_ci, 122.0);
        assert_eq!(ens.upper_tot, 120.0);
        assert_eq!(ens.upper_unc, 2.0);
        assert_eq!(ens.delta, 30.0);
        assert_eq!(ens.lower_tot, 90.0);
        assert_eq!(ens.lower_ci, 60.0);
        assert_eq!(ens.lower_unc, -30.0);
        assert_eq!(ens.total_ci, 62.0);
        assert!(ens.upper_ci >= ens.upper_tot);
        assert!(ens.upper_tot >= ens.lower_tot);
        assert!(ens.lower_tot >= ens.lower_ci);
        assert_eq!(ens.to_table("CO2", "gC m-2").rows.len(), 8);
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(ensemble(&[]), Err(AnalysisError::EmptyEnsemble(_))));
    }

    #[test]
    fn selection_by_pattern_and_gas_default() {
        let sums = [
            sum("IP_lin", 1.0, 0.1),
            sum("LUT_V1_d3", 2.0, 0.1),
            sum("LUT_V1_d7", 3.0, 0.1),
            sum("MDC_d7", 4.0, 0.1),
        ];
        let nh3 = select_techniques(&sums, None, "NH3").unwrap();
        let names: Vec<&str> = nh3.iter().map(|s| s.technique.as_str()).collect();
        assert_eq!(names, ["IP_lin", "LUT_V1_d7"]);

        assert_eq!(select_techniques(&sums, None, "CO2").unwrap().len(), 4);
        assert_eq!(select_techniques(&sums, Some("MDC"), "CO2").unwrap().len(), 1);
        assert!(matches!(
            select_techniques(&sums, Some("ANN"), "CO2"),
            Err(AnalysisError::EmptyEnsemble(p)) if p == "ANN"
        ));
        assert!(matches!(
            select_techniques(&sums, Some("("), "CO2"),
            Err(AnalysisError::Pattern { .. })
        ));
    }
}
