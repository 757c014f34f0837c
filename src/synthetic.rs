//! Synthetic half-hourly flux series.
//!
//! Produces a valid [`TimeSeries`] with `Rg`, `Tair` and `VPD` covariates on
//! diurnal cycles and a CO2-like flux (light-driven uptake plus
//! temperature-driven respiration) with Gaussian noise and random gaps.
//! Deterministic for a given seed; used by the `synthetic-flux` binary and
//! the integration tests.

use chrono::{NaiveDate, Timelike};
use std::f64::consts::PI;
use rand::distributions::Uniform;
use rand::prelude::*;
use rand_distr::StandardNormal;

use crate::config::defaults::{HALF_HOURS_PER_DAY, SHORT_GAP_HALF_HOURS};
use crate::series::{is_missing, stamp_shift, SeriesError, TimeSeries};

// ============================================================================
// Model Constants
// ============================================================================

/// Clear-sky global radiation at solar noon (W m-2)
const RG_PEAK: f64 = 800.0;
/// Mean air temperature (°C)
const TAIR_MEAN: f64 = 15.0;
/// Diurnal air temperature amplitude (°C)
const TAIR_AMPLITUDE: f64 = 7.0;
/// Light-saturated uptake (umol m-2 s-1)
const GPP_MAX: f64 = 20.0;
/// Half-saturation radiation of the uptake curve (W m-2)
const GPP_HALF_SAT: f64 = 400.0;
/// Respiration at 10 °C (umol m-2 s-1)
const RESP_REF: f64 = 2.0;
/// Longest synthetic gap (half-hours)
const LONG_GAP_MAX: usize = 3 * HALF_HOURS_PER_DAY;
/// Share of gap runs that are long
const LONG_GAP_SHARE: f64 = 0.1;

/// Builder for a synthetic flux series.
#[derive(Debug, Clone)]
pub struct SyntheticFlux {
    pub first_day: NaiveDate,
    pub days: usize,
    pub seed: u64,
    /// Target share of missing flux half-hours (0..1).
    pub gap_fraction: f64,
    pub noise_sd: f64,
    pub flux_column: String,
}

impl Default for SyntheticFlux {
    fn default() -> Self {
        Self {
            first_day: NaiveDate::from_ymd_opt(2021, 6, 1).unwrap_or_default(),
            days: 30,
            seed: 42,
            gap_fraction: 0.25,
            noise_sd: 1.0,
            flux_column: "FC".to_string(),
        }
    }
}

impl SyntheticFlux {
    pub fn new(days: usize) -> Self {
        Self {
            days,
            ..Self::default()
        }
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn gap_fraction(mut self, fraction: f64) -> Self {
        self.gap_fraction = fraction.clamp(0.0, 0.9);
        self
    }

    pub fn noise_sd(mut self, sd: f64) -> Self {
        self.noise_sd = sd.max(0.0);
        self
    }

    pub fn first_day(mut self, day: NaiveDate) -> Self {
        self.first_day = day;
        self
    }

    pub fn flux_column(mut self, name: &str) -> Self {
        self.flux_column = name.to_string();
        self
    }

    pub fn build(&self) -> Result<TimeSeries, SeriesError> {
        let series = TimeSeries::whole_days(self.first_day, self.days)?;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let noise_sd = if self.noise_sd.is_finite() { self.noise_sd.max(0.0) } else { 0.0 };
        let cloudiness = Uniform::new_inclusive(0.3, 1.0);

        let n = series.len();
        let mut rg = Vec::with_capacity(n);
        let mut tair = Vec::with_capacity(n);
        let mut vpd = Vec::with_capacity(n);
        let mut flux = Vec::with_capacity(n);

        for day in 0..series.num_days() {
            let clouds = cloudiness.sample(&mut rng);
            let warm = 2.0 * rng.sample::<f64, _>(StandardNormal);
            for row in series.day_rows(day) {
                // centre of the averaging interval, in hours
                let mid = series.timestamp(row) - stamp_shift();
                let hour = f64::from(mid.hour()) + f64::from(mid.minute()) / 60.0;

                let sun = (PI * (hour - 6.0) / 12.0).sin();
                let light = (RG_PEAK * clouds * sun).max(0.0);
                let cycle = (2.0 * PI * (hour - 9.0) / 24.0).sin();
                let temp = TAIR_MEAN + warm + TAIR_AMPLITUDE * cycle;
                let deficit = (0.6 * (temp - 5.0)).max(0.0);
                let uptake = GPP_MAX * light / (light + GPP_HALF_SAT);
                let respiration = RESP_REF * (0.07 * (temp - 10.0)).exp();

                rg.push(light);
                tair.push(temp);
                vpd.push(deficit);
                flux.push(respiration - uptake + noise_sd * rng.sample::<f64, _>(StandardNormal));
            }
        }

        self.punch_gaps(&mut flux, &mut rng);

        series
            .with_channel("Rg", rg)?
            .with_channel("Tair", tair)?
            .with_channel("VPD", vpd)?
            .with_channel(self.flux_column.clone(), flux)
    }

    /// Mask random runs until the target share of rows is missing.
    ///
    /// Runs never touch an existing gap, so the longest gap stays within
    /// `LONG_GAP_MAX`.
    fn punch_gaps(&self, flux: &mut [f64], rng: &mut StdRng) {
        let n = flux.len();
        let target = (self.gap_fraction * n as f64) as usize;
        if target == 0 || n <= LONG_GAP_MAX {
            return;
        }
        let mut missing = 0;
        let mut attempts = 0;
        while missing < target && attempts < 10 * n {
            attempts += 1;
            let len = if rng.gen_bool(LONG_GAP_SHARE) {
                rng.gen_range(SHORT_GAP_HALF_HOURS + 1..=LONG_GAP_MAX)
            } else {
                rng.gen_range(1..=SHORT_GAP_HALF_HOURS)
            };
            let start = rng.gen_range(1..n - len);
            let touched = &flux[start - 1..=start + len];
            if touched.iter().any(|v| is_missing(*v)) {
                continue;
            }
            flux[start..start + len].fill(f64::NAN);
            missing += len;
        }
    }
}
