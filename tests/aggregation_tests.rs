//! Aggregation Tests
//!
//! Error estimates, period sums and ensembles computed from a filled and
//! bootstrapped synthetic series.

use multigap::analysis::{
    ensemble, estimate_errors, select_techniques, sum_period, AnalysisError, PeriodSum,
};
use multigap::bootstrap::bootstrap_time_of_day;
use multigap::config::Settings;
use multigap::filling::{fill_real_gaps, simulate};
use multigap::series::TimeSeries;
use multigap::synthetic::SyntheticFlux;
use multigap::techniques::Registry;
use multigap::types::{Scenario, TimeOfDay};

fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.bootstrap.repetitions = 30;
    settings
}

fn filled_series(gap_fraction: f64, settings: &Settings) -> TimeSeries {
    let mut series = SyntheticFlux::new(24).seed(11).gap_fraction(gap_fraction).build().unwrap();
    series.prepare_observed(&settings.flux).unwrap();
    let registry = Registry::from_settings(settings);
    simulate(&mut series, &registry, settings).unwrap();
    fill_real_gaps(&mut series, settings).unwrap();
    series
}

fn sums_for(series: &TimeSeries, settings: &Settings) -> Vec<PeriodSum> {
    let hhs =
        bootstrap_time_of_day(series, settings, Scenario::HalfHour, TimeOfDay::FullTime).unwrap();
    let days = bootstrap_time_of_day(series, settings, Scenario::Day, TimeOfDay::FullTime).unwrap();
    let errors = estimate_errors(&hhs, &days);
    sum_period(series, settings, &errors).unwrap()
}

#[test]
fn complete_series_has_no_filled_sum() {
    let settings = settings();
    let series = filled_series(0.0, &settings);
    let sums = sums_for(&series, &settings);
    assert!(!sums.is_empty());
    for s in &sums {
        assert_eq!(s.sum_fill_real, 0.0, "{}", s.technique);
        assert_eq!(s.sum_total, s.sum_obs, "{}", s.technique);
        assert_eq!(s.miss_fill_real, 0);
        assert_eq!(s.bias_gaps, 0.0, "no gaps, no bias uncertainty");
        assert!(s.random_all > 0.0);
    }
}

#[test]
fn gappy_series_sums_and_ensemble_bounds() {
    let settings = settings();
    let series = filled_series(0.25, &settings);
    let sums = sums_for(&series, &settings);

    let registry = Registry::from_settings(&settings);
    assert_eq!(sums.len(), registry.len(), "every technique has both scenarios");
    for s in &sums {
        assert!((s.sum_total - (s.sum_obs + s.sum_fill_real)).abs() < 1e-3);
        assert!(s.bias_gaps > 0.0, "{} has gap bias", s.technique);
        assert!(s.lower_ci <= s.sum_total && s.sum_total <= s.upper_ci);
    }

    let ens = ensemble(&sums).unwrap();
    assert!(ens.upper_ci >= ens.upper_tot);
    assert!(ens.upper_tot >= ens.lower_tot);
    assert!(ens.lower_tot >= ens.lower_ci);
    assert!((ens.total_ci - (ens.upper_ci - ens.lower_ci)).abs() <= 0.1 + 1e-9);
}

#[test]
fn ensemble_selection_narrows_the_envelope() {
    let settings = settings();
    let series = filled_series(0.25, &settings);
    let sums = sums_for(&series, &settings);

    let all = ensemble(&sums).unwrap();
    let subset = select_techniques(&sums, Some("^MDC"), &settings.flux.gas).unwrap();
    assert_eq!(subset.len(), 2);
    let narrow = ensemble(&subset).unwrap();
    assert!(narrow.upper_ci <= all.upper_ci);
    assert!(narrow.lower_ci >= all.lower_ci);
    assert!(narrow.delta <= all.delta);

    assert!(matches!(
        select_techniques(&sums, Some("^XYZ"), &settings.flux.gas),
        Err(AnalysisError::EmptyEnsemble(_))
    ));
}
