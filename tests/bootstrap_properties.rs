//! Bootstrap Property Tests
//!
//! Determinism under a fixed seed (sequential and parallel scoring), exact
//! statistics for a perfect technique, eligibility bookkeeping and the
//! day/night split, on a synthetic series.

use multigap::bootstrap::{bootstrap, bootstrap_time_of_day, BootstrapError, BootstrapResult};
use multigap::config::{BootstrapSettings, Settings};
use multigap::series::TimeSeries;
use multigap::synthetic::SyntheticFlux;
use multigap::types::{Scenario, Statistic, TimeOfDay};

fn series_with_techniques() -> TimeSeries {
    let mut series = SyntheticFlux::new(20).seed(3).gap_fraction(0.2).build().unwrap();
    let obs = series.channel("FC").unwrap().to_vec();
    series.insert_channel("flux_obs", obs.clone()).unwrap();

    let shifted: Vec<f64> = obs
        .iter()
        .enumerate()
        .map(|(i, o)| o + 0.3 * ((i % 5) as f64 - 2.0))
        .collect();
    let mut partial = shifted.clone();
    partial[100..110].fill(f64::NAN);

    for scenario in Scenario::ALL {
        // gaps in the observed channel do not matter for the predictions
        let perfect: Vec<f64> = obs.iter().map(|o| if o.is_nan() { 0.0 } else { *o }).collect();
        series.insert_channel(scenario.channel_name("PERFECT"), perfect).unwrap();
        let noisy: Vec<f64> = shifted.iter().map(|v| if v.is_nan() { 0.0 } else { *v }).collect();
        series.insert_channel(scenario.channel_name("NOISY"), noisy).unwrap();
    }
    series.insert_channel("PARTIAL_hhs", partial).unwrap();
    series
}

fn params(repetitions: usize, seed: u64) -> BootstrapSettings {
    BootstrapSettings {
        repetitions,
        sample_percent: 50.0,
        seed,
    }
}

fn bits(result: &BootstrapResult) -> Vec<u64> {
    Statistic::ALL
        .iter()
        .flat_map(|&stat| {
            (0..result.repetitions).flat_map(move |rep| {
                (0..result.techniques.len()).map(move |t| result.get(stat, rep, t).to_bits())
            })
        })
        .collect()
}

#[test]
fn same_seed_gives_bit_identical_results() {
    let series = series_with_techniques();
    for scenario in Scenario::ALL {
        let a = bootstrap(&series, "flux_obs", scenario, &params(40, 99), false).unwrap();
        let b = bootstrap(&series, "flux_obs", scenario, &params(40, 99), false).unwrap();
        let c = bootstrap(&series, "flux_obs", scenario, &params(40, 99), true).unwrap();
        assert_eq!(bits(&a), bits(&b), "{scenario}: repeated run differs");
        assert_eq!(bits(&a), bits(&c), "{scenario}: parallel run differs");

        let other = bootstrap(&series, "flux_obs", scenario, &params(40, 100), false).unwrap();
        assert_ne!(bits(&a), bits(&other), "{scenario}: seed has no effect");
    }
}

#[test]
fn perfect_technique_scores_exactly() {
    let series = series_with_techniques();
    for scenario in Scenario::ALL {
        let result = bootstrap(&series, "flux_obs", scenario, &params(25, 99), false).unwrap();
        let t = result.techniques.iter().position(|n| n.starts_with("PERFECT")).unwrap();
        for rep in 0..result.repetitions {
            assert_eq!(result.get(Statistic::Bias, rep, t), 0.0);
            assert_eq!(result.get(Statistic::SDev, rep, t), 0.0);
            let r2 = result.get(Statistic::R2, rep, t);
            assert!((r2 - 1.0).abs() < 1e-12, "{scenario} rep {rep}: R2 {r2}");
        }

        let noisy = result.distribution(Statistic::SDev, &scenario.channel_name("NOISY")).unwrap();
        assert!(noisy.iter().all(|v| *v > 0.0), "noisy technique has a deviation");
    }
}

#[test]
fn incomplete_coverage_is_excluded_not_fatal() {
    let series = series_with_techniques();
    let hhs = bootstrap(&series, "flux_obs", Scenario::HalfHour, &params(5, 1), false).unwrap();
    let days = bootstrap(&series, "flux_obs", Scenario::Day, &params(5, 1), false).unwrap();

    let measured = series.channel("flux_obs").unwrap().iter().filter(|v| !v.is_nan()).count();
    assert_eq!(hhs.techniques.len(), 3);
    assert_eq!(days.techniques.len(), 2);
    assert_eq!(days.eligible_points, measured);
    assert_eq!(hhs.eligible_points + hhs.excluded_points, measured);
    assert!(hhs.excluded_points <= 10);
}

#[test]
fn day_and_night_split_the_eligible_points() {
    let series = series_with_techniques();
    let mut settings = Settings::default();
    settings.bootstrap = params(5, 99);

    let count = |tod| {
        bootstrap_time_of_day(&series, &settings, Scenario::Day, tod)
            .unwrap()
            .eligible_points
    };
    let (ft, dt, nt) =
        (count(TimeOfDay::FullTime), count(TimeOfDay::DayTime), count(TimeOfDay::NightTime));
    assert_eq!(dt + nt, ft);
    assert!(dt > 0 && nt > 0);

    settings.light.covariate.clear();
    assert!(matches!(
        bootstrap_time_of_day(&series, &settings, Scenario::Day, TimeOfDay::DayTime),
        Err(BootstrapError::NoLightSplit(TimeOfDay::DayTime))
    ));
}

#[test]
fn invalid_parameters_are_rejected() {
    let series = series_with_techniques();
    assert!(matches!(
        bootstrap(&series, "flux_obs", Scenario::Day, &params(0, 1), false),
        Err(BootstrapError::NoRepetitions)
    ));
    let mut p = params(5, 1);
    p.sample_percent = 0.0;
    assert!(matches!(
        bootstrap(&series, "flux_obs", Scenario::Day, &p, false),
        Err(BootstrapError::InvalidSamplePercent(_))
    ));
}
